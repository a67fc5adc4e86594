//! Identity-provisioning service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CafRefNo;

use crate::error::SagaError;

/// Supplies permanent IMSIs for USIM cases.
#[async_trait]
pub trait IdentityProvisioning: Send + Sync {
    /// Returns the permanent IMSI to bind to the case.
    async fn permanent_imsi(
        &self,
        caf_ref_no: &CafRefNo,
        supplied_imsi: Option<&str>,
    ) -> Result<String, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryIdentityState {
    issued: HashMap<CafRefNo, String>,
    next_serial: u64,
    calls: usize,
    fail: bool,
}

/// In-memory identity provisioning for testing.
///
/// Issues sequential IMSIs under the `46000` prefix; a case asking twice gets
/// the same IMSI back.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityProvisioning {
    state: Arc<RwLock<InMemoryIdentityState>>,
}

impl InMemoryIdentityProvisioning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail every lookup.
    pub fn set_fail(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail = fail;
        }
    }

    /// Returns how many lookups were made.
    pub fn call_count(&self) -> usize {
        self.state.read().map(|s| s.calls).unwrap_or_default()
    }
}

#[async_trait]
impl IdentityProvisioning for InMemoryIdentityProvisioning {
    async fn permanent_imsi(
        &self,
        caf_ref_no: &CafRefNo,
        _supplied_imsi: Option<&str>,
    ) -> Result<String, SagaError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| SagaError::IdentityProvisioning("state poisoned".to_string()))?;
        state.calls += 1;

        if state.fail {
            return Err(SagaError::IdentityProvisioning(
                "provisioning service unavailable".to_string(),
            ));
        }

        if let Some(imsi) = state.issued.get(caf_ref_no) {
            return Ok(imsi.clone());
        }

        state.next_serial += 1;
        let imsi = format!("46000{:010}", state.next_serial);
        state.issued.insert(caf_ref_no.clone(), imsi.clone());
        Ok(imsi)
    }
}
