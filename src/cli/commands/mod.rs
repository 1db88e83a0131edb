pub mod controller;

pub use controller::handle_controller;
