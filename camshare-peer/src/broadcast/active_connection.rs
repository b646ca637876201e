use crate::transport::MediaCall;
use camshare_core::model::ConnectionStatus;
use camshare_core::{CallId, PeerId};
use std::sync::Arc;

/// One viewer the camera is streaming to.
pub struct ActiveConnection {
    remote: PeerId,
    call: Arc<dyn MediaCall>,
    status: ConnectionStatus,
}

impl ActiveConnection {
    pub fn answering(call: Arc<dyn MediaCall>) -> Self {
        Self {
            remote: call.remote_peer().clone(),
            call,
            status: ConnectionStatus::Answering,
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call.id()
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn mark_open(&mut self) {
        if self.status == ConnectionStatus::Answering {
            self.status = ConnectionStatus::Open;
        }
    }

    pub fn close(&mut self) {
        self.status = ConnectionStatus::Closed;
        self.call.close();
    }

    pub fn fail(&mut self) {
        self.status = ConnectionStatus::Error;
        self.call.close();
    }
}
