pub mod audio;
pub mod bus;
pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod playback;
pub mod publish;
pub mod router;
pub mod server;
pub mod state;

pub use capture::CaptureWorker;
pub use config::Config;
pub use error::StartupError;
pub use playback::PlaybackHandler;
pub use publish::ChunkPublisher;
pub use router::ControlRouter;
pub use state::{ModeRegister, ModeSnapshot};
