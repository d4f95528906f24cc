//! World Data
//!
//! The expression engine does not own any simulation state. Link leaves read
//! from the small set of types defined here:
//!
//! - [`Attribute`]: an observable value cell
//! - [`WorldObject`]: a named bag of attributes
//! - [`Source`]: a slot pointing at (at most) one object
//! - [`Substitution`]: the role-name to source mapping a tree is bound with
//! - [`Sensor`]: an opaque perception channel passed to `change_sensors`
//!
//! All of them are cheap handles over shared cells. Writes notify the
//! subscribers registered by bound leaves, which in turn post the leaf into
//! its arena's signal inbox.

mod attribute;
mod object;
mod subscriber;

pub use attribute::{Attribute, AttributeId};
pub use object::{ObjectId, Sensor, SensorId, Source, SourceId, Substitution, WorldObject};
pub use subscriber::{SubscriberId, Subscription};
