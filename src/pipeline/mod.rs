// Wide-to-relational transform: classification, normalization passes, linking

pub mod classify;
pub mod link;
pub mod normalize;
pub mod resolver;
pub mod throttle;

pub use classify::{classify, ColumnLayout};
pub use link::link;
pub use normalize::{EntityNormalizer, NormalizeOptions};
pub use resolver::{KeyResolver, SyntheticIndex};
pub use throttle::{Limits, WriteThrottle};
