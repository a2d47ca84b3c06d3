use std::sync::Arc;

use nimble_blob::BlobLifecycle;

#[derive(Clone)]
pub struct BlobState {
    pub blobs: Arc<BlobLifecycle>,
}

impl BlobState {
    pub fn new(blobs: Arc<BlobLifecycle>) -> Self {
        Self { blobs }
    }
}
