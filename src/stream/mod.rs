//! Real-Time Event Streaming
//!
//! Pushes host metrics to dashboard clients over Server-Sent Events.
//!
//! ## Architecture
//!
//! - **Hub**: one task owning the client registry; fans frames out to
//!   bounded per-client buffers and drops frames a slow client cannot take
//! - **Session**: the response body of one client
//! - **Handler**: the HTTP entry point
//! - **Frame**: `text/event-stream` encoding
//!
//! ## Usage
//!
//! ```javascript
//! // Browser
//! const source = new EventSource('/api/stream');
//! source.addEventListener('connected', (e) => console.log(JSON.parse(e.data)));
//! source.onmessage = (e) => render(JSON.parse(e.data));
//! ```

mod frame;
mod handler;
mod hub;
mod session;

pub use frame::{Frame, CONNECTED_EVENT, METRICS_EVENT};
pub use handler::{stream_handler, supports_incremental_flush};
pub use hub::{ClientId, Hub, HubConfig, HubError, HubHandle, Subscription};
pub use session::{Session, SessionState};
