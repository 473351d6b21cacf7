//! Auth-domain identifiers, bearer secrets, and token models.

pub mod id;
pub mod token;

pub use id::*;
pub use token::{claims::*, record::*, secret::*};
