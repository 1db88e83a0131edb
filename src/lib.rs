//! A cluster-resident certificate lifecycle controller.
//!
//! Reconciles `Certificate`/`Issuer`/`ClusterIssuer` resources against a
//! pluggable `ResourceStore`, driving certificate issuance and renewal
//! through an ACME v2 (RFC 8555) order state machine. HTTP-01 and DNS-01
//! challenges are solved through the `ChallengeDriver` seam; a webhook
//! bootstrap controller keeps the admission webhook's serving certificate
//! self-signed and current.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> certctl::error::Result<()> {
//!     certctl::cli::commands::handle_controller(2, None).await
//! }
//! ```

// Module declarations
pub mod account;
pub mod certificate;
pub mod challenge;
pub mod cli;
pub mod clock;
pub mod config;
pub mod controller;
pub mod conversion;
pub mod crypto;
pub mod error;
pub mod issuer;
pub mod metrics;
pub mod order;
pub mod protocol;
pub mod queue;
pub mod resource;
pub mod scheduler;
pub mod store;
pub mod transport;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use account::{Account, AccountManager, KeyPair, KeyRollover};
pub use certificate::CertificateChain;
pub use challenge::{
    CachingDnsResolver, ChallengeDriver, ChallengeDriverRegistry, Dns01Driver, DnsCache,
    DnsProvider, Http01Driver, MockDnsProvider,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ChallengeSettings, Config, ControllerSettings};
pub use controller::{ControllerRuntime, KeyLister, LeaderGate, Sync as ControllerSync};
pub use error::{AcmeError, Result};
pub use issuer::{CertificateIssuer, IssuerDeps, IssuerFactory, IssuerRegistry};
pub use metrics::{HealthStatus, MetricsRegistry};
pub use order::{
    Authorization, CertificateRevocation, Challenge, CsrGenerator, FinalizationRequest,
    NewOrderRequest, Order, OrderManager, parse_certificate_chain, verify_certificate_domains,
};
pub use protocol::{Directory, DirectoryManager, Jwk, JwsSigner, NonceManager};
pub use queue::RateLimitedQueue;
pub use resource::{
    Certificate, CertificateSpec, CertificateStatus, Condition, ConditionStatus,
    Issuer as ClusterResourceIssuer, IssuerRef, IssuerRefKind, IssuerSpec as ClusterResourceIssuerSpec,
    ObjectMeta,
};
pub use types::{
    AuthorizationStatus, ChallengeType, Contact, Identifier, OrderStatus, RevocationReason,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        account::{Account, AccountManager, KeyPair, KeyRollover},
        certificate::CertificateChain,
        crypto::{Base64Encoding, Sha256Hash},
        error::{AcmeError, Result},
        order::{
            Authorization, CertificateRevocation, Challenge, FinalizationRequest, NewOrderRequest,
            Order,
        },
        protocol::{Directory, DirectoryManager, Jwk, JwsSigner, NonceManager},
        transport::HttpClient,
        types::{
            AuthorizationStatus, ChallengeType, Contact, Identifier, OrderStatus, RevocationReason,
        },
    };
}
