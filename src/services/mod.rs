pub mod bootstrap;
pub mod session;
pub mod todo_store;

pub use bootstrap::SessionBootstrap;
pub use session::{AuthState, PendingLoad, Session, SessionView, SharedSession, reload};
pub use todo_store::{LoadStatus, Outcome, TodoStore};
