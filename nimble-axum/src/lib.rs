//! nimble-axum: HTTP surface for the nimble blob lifecycle.
//!
//! | Route                       | Behavior                                   |
//! |-----------------------------|--------------------------------------------|
//! | `POST /blobs?storage=<tag>` | stage an upload (multipart `file` or raw)  |
//! | `GET /blobs/{name}`         | object bytes, from staging or remote       |
//! | `GET /blobs/{name}/status`  | JSON status of the object                  |
//! | `GET /health`               | `ok`                                       |
//!
//! Errors render as `{ name, message, code, className }`.

mod app;
mod error;
mod routes;
mod state;

pub use app::{BlobApp, DEFAULT_BODY_LIMIT};
pub use error::{ApiError, ErrorKind};
pub use routes::{BlobStatus, ORIGIN_HEADER};
pub use state::BlobState;
