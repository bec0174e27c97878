pub use tryon_protocol::*;
