// Domain layer: game rules, identities, errors and ports.

pub mod errors;
pub mod identity;
pub mod ports;
pub mod role;
pub mod round;

pub use identity::Identity;
pub use role::{GameOption, Role, Ruleset};
pub use round::{Mission, Round, RoundResult, Status};
