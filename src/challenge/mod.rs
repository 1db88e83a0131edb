//! Challenge drivers (C7): `ChallengeDriver` implementations for HTTP-01 and
//! DNS-01, plus the `DnsProvider` seam and DNS resolver cache they build on.

pub mod dns01;
pub mod dns_cache;
pub mod driver;

pub use dns01::{DnsProvider, MockDnsProvider};
pub use dns_cache::{CachingDnsResolver, DnsCache};
pub use driver::{ChallengeDriver, ChallengeDriverRegistry, Dns01Driver, Http01Driver};
