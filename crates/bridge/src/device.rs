//! Exclusive use of debug devices.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::BridgeError;

/// Devices currently claimed by a session. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    in_use: Arc<Mutex<HashSet<String>>>,
}

impl DeviceRegistry {
    pub fn acquire(&self, device: &str) -> Result<(), BridgeError> {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_use.insert(device.to_string()) {
            return Err(BridgeError::DeviceInUse(device.to_string()));
        }
        tracing::debug!(device, "device acquired");
        Ok(())
    }

    pub fn release(&self, device: &str) -> bool {
        let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
        let released = in_use.remove(device);
        if released {
            tracing::debug!(device, "device released");
        }
        released
    }

    pub fn is_in_use(&self, device: &str) -> bool {
        self.in_use
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_exclusive() {
        let registry = DeviceRegistry::default();
        let other = registry.clone();

        registry.acquire("phone").unwrap();
        assert!(matches!(
            other.acquire("phone"),
            Err(BridgeError::DeviceInUse(_))
        ));
        other.acquire("emulator").unwrap();

        assert!(registry.release("phone"));
        assert!(!registry.release("phone"));
        assert!(!other.is_in_use("phone"));
        other.acquire("phone").unwrap();
    }
}
