//! APPRENTICES: host maintenance

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Capability, CapabilityDescriptor, CapabilityError, InvocationContext};

const DROP_CACHES: &str = "sudo sh -c 'sync; echo 3 > /proc/sys/vm/drop_caches'";

/// Hands back the root command that drops the Linux page cache.
///
/// Never runs it: the workshop does not hold root.
pub struct CacheManager {
    descriptor: CapabilityDescriptor,
}

impl CacheManager {
    pub fn new() -> Self {
        Self {
            descriptor: CapabilityDescriptor::new(
                "cache_manager",
                "Prepare the command that clears the Linux page cache (requires root; the user runs it).",
            ),
        }
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for CacheManager {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        _params: Map<String, Value>,
        _ctx: &InvocationContext,
    ) -> Result<Value, CapabilityError> {
        if !cfg!(target_os = "linux") {
            return Err(CapabilityError::new(
                "Cache management is only supported on Linux",
            ));
        }
        Ok(Value::String(format!(
            "ACTION_REQUIRED: This action requires root. Run the following command in your terminal:\n{}",
            DROP_CACHES
        )))
    }
}
