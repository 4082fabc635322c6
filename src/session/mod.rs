pub mod commands;
pub mod controller;
pub mod state;
pub mod view;

pub use controller::SessionController;
pub use state::{CameraStatus, DetectionOutcome, Notice, NoticeKind, ScanState, SessionState};
pub use view::SessionView;
