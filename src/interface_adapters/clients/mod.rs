pub mod identity;

pub use identity::{GuestIdentity, IdentityClient};
