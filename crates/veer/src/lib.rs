//! veer
//!
//! Drives server-rendered pages in place. Link clicks and form submissions
//! become fetches whose HTML replaces or morphs the live document, while
//! history, a snapshot cache, frames and push-fragment streams keep the
//! page feeling like an application.
//!
//! # Example
//! ```rust,ignore
//! use veer::{Session, VisitOptions};
//!
//! let session = Session::builder("https://example.com/", "<html>...</html>").build()?;
//! let outcome = session.run(session.visit("/posts", VisitOptions::default()))?;
//! println!("{outcome:?}: {}", session.html());
//! ```

mod config;
mod error;
pub mod adapter;
pub mod cache;
pub mod events;
pub mod form_submission;
pub mod frame;
pub mod history;
pub mod navigator;
pub mod renderer;
pub mod scheduler;
pub mod snapshot;
pub mod stream;
pub mod view;
pub mod visit;
mod session;

pub use config::Config;
pub use error::{Result, VeerError};
pub use adapter::{Adapter, BehaviorHost, BrowserAdapter, NoopBehaviorHost, ReloadReason};
pub use cache::{PrefetchCache, SnapshotCache};
pub use events::{EventBus, EventDetail, EventName, LifecycleEvent, ListenerId, RenderFn};
pub use form_submission::{FormSubmission, FormSubmissionState};
pub use frame::{FrameController, FrameLoading, FrameRegistry};
pub use history::{BrowserHistory, Direction, HistoryBridge, HistoryState, MemoryHistory};
pub use navigator::Navigator;
pub use renderer::{RenderKind, RenderOutcome, Renderer};
pub use session::{Session, SessionBuilder};
pub use snapshot::{PageSnapshot, RefreshMethod, RefreshScroll};
pub use stream::{StreamAction, StreamElement, StreamTarget};
pub use view::{ScrollPosition, View};
pub use visit::{TimingMetrics, Visit, VisitAction, VisitOptions, VisitOutcome, VisitState};

// Re-export sub-crates for advanced usage
pub use veer_dom as dom;
pub use veer_html as html;
pub use veer_net as net;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
