//! Plain data shared by every component: positions, orders, money, presence.

pub mod location;
pub mod money;
pub mod order;
pub mod presence;

pub use location::*;
pub use money::*;
pub use order::*;
pub use presence::*;
