/// Access log line parsing
pub mod line_parser;

/// Line source abstraction and reader-backed implementation
pub mod log_source;

/// `docker logs -f` line source
pub mod docker_source;

/// Readiness wait for the log source
pub mod readiness;

pub use docker_source::DockerLogSource;
pub use line_parser::{parse_line, parse_line_at};
pub use log_source::{LineSource, SourceLine, StreamSource};
pub use readiness::{wait_until_ready, DockerContainerCheck, ReadinessCheck};
