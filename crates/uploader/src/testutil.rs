//! Scripted transport for actor tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use stowage_protocol::{FileMetadata, TransportError};
use stowage_transport::{Transport, TransportConfig, UploadRequest};

/// Script for one upload call: cumulative progress reports, an optional
/// hold (the call blocks until the sender fires or drops), then the
/// result.
pub(crate) struct UploadPlan {
    pub progress: Vec<u64>,
    pub result: Result<FileMetadata, TransportError>,
    pub hold: Option<oneshot::Receiver<()>>,
}

/// Transport that replays [`UploadPlan`]s keyed by file name, one per
/// attempt in order. An unplanned call fails with a status-0 error.
pub(crate) struct MockTransport {
    plans: Mutex<HashMap<String, VecDeque<UploadPlan>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(HashMap::new()),
        })
    }

    pub fn plan(&self, name: &str, plan: UploadPlan) {
        self.plans
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(plan);
    }
}

impl Transport for MockTransport {
    fn upload(
        &self,
        _config: TransportConfig,
        request: UploadRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FileMetadata, TransportError>> + Send + '_>> {
        let plan = self
            .plans
            .lock()
            .unwrap()
            .get_mut(&request.name)
            .and_then(VecDeque::pop_front);

        Box::pin(async move {
            let Some(plan) = plan else {
                return Err(TransportError::network(format!(
                    "no upload plan for {}",
                    request.name
                )));
            };
            if let Some(progress) = &request.progress {
                for loaded in &plan.progress {
                    let _ = progress.send(*loaded);
                }
            }
            if let Some(hold) = plan.hold {
                let _ = hold.await;
            }
            plan.result
        })
    }
}

/// A successful, uploaded file record.
pub(crate) fn meta(id: &str, name: &str, size: u64) -> FileMetadata {
    FileMetadata {
        id: id.into(),
        name: name.into(),
        size,
        bucket_id: "default".into(),
        etag: None,
        created_at: None,
        updated_at: None,
        is_uploaded: true,
        mime_type: None,
        uploaded_by_user_id: None,
        metadata: None,
    }
}
