//! A bench of simulated modems behind the port-provider seam

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use mbm_proto::{ModemPort, PortProvider};
use tracing::warn;

use crate::modem::{FailPoint, ModemScript, SimModem};

/// Maps node names to simulated modems
///
/// Asking for a name nobody registered yields a modem whose open fails, the
/// same outcome a vanished device produces on real hardware.
#[derive(Debug, Default)]
pub struct SimRig {
    modems: Mutex<HashMap<String, Arc<SimModem>>>,
}

impl SimRig {
    /// Create an empty rig
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<SimModem>>> {
        match self.modems.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register the modem behind a node name
    pub fn insert(&self, name: &str, modem: Arc<SimModem>) {
        self.lock().insert(name.to_string(), modem);
    }

    /// Register a modem built from a script, returning it for inspection
    pub fn insert_script(&self, name: &str, script: ModemScript) -> Arc<SimModem> {
        let modem = Arc::new(SimModem::new(script));
        self.insert(name, modem.clone());
        modem
    }

    /// Look up a registered modem
    pub fn modem(&self, name: &str) -> Option<Arc<SimModem>> {
        self.lock().get(name).cloned()
    }
}

impl PortProvider for SimRig {
    fn open_port(&self, node_name: &str) -> Arc<dyn ModemPort> {
        if let Some(modem) = self.modem(node_name) {
            return modem;
        }
        warn!(node = %node_name, "no simulated modem registered, open will fail");
        Arc::new(SimModem::new(ModemScript {
            fail_at: Some(FailPoint::Open),
            ..ModemScript::default()
        }))
    }
}
