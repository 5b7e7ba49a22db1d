//! switchboard-signaling – Live-Verteilung von Anlagen-Ereignissen
//!
//! Der `EventBroadcaster` haelt die Menge der Live-Abonnenten und stellt
//! jedes normalisierte Ereignis an alle zu. Abonnenten sind `EventSink`s;
//! der mitgelieferte `QueueSink` koppelt einen Abonnenten ueber eine
//! begrenzte tokio-Queue an seinen Transport-Task.
//!
//! ```text
//! Event-Interpreter (einziger Erzeuger)
//!     |
//!     v
//! EventBroadcaster --+-- QueueSink -> WebSocket-Task
//!                    +-- QueueSink -> WebSocket-Task
//!                    +-- ...
//! ```

pub mod broadcast;
pub mod error;

// Bequeme Re-Exporte
pub use broadcast::{EventBroadcaster, EventSink, QueueSink};
pub use error::{SignalingResult, ZustellFehler};
