use crate::{FrameTransport, RegistryError, Role};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// One configured CAN interface.
pub struct InterfaceEntry {
    name: String,
    role: Role,
    transport: Arc<dyn FrameTransport>,
    registered: AtomicBool,
}

impl InterfaceEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn transport(&self) -> &Arc<dyn FrameTransport> {
        &self.transport
    }

    /// Whether a receive consumer has been attached.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Move from unregistered to registered; `false` if already registered.
    pub(crate) fn mark_registered(&self) -> bool {
        !self.registered.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for InterfaceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceEntry")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// The fixed set of interfaces for the life of a processor.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    entries: BTreeMap<String, InterfaceEntry>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        name: impl Into<String>,
        role: Role,
        transport: Arc<dyn FrameTransport>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        info!(interface = %name, %role, "interface added");
        self.entries.insert(
            name.clone(),
            InterfaceEntry {
                name,
                role,
                transport,
                registered: AtomicBool::new(false),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&InterfaceEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterfaceEntry> {
        self.entries.values()
    }

    pub fn receivers(&self) -> impl Iterator<Item = &InterfaceEntry> {
        self.iter().filter(|e| e.role.can_receive())
    }

    pub fn senders(&self) -> impl Iterator<Item = &InterfaceEntry> {
        self.iter().filter(|e| e.role.can_send())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BusTransport;
    use can_transport::{CanBus, MockBus};

    fn mock(name: &str) -> Arc<dyn FrameTransport> {
        Arc::new(BusTransport::new(MockBus::open(name).unwrap()).unwrap())
    }

    #[test]
    fn test_roles_partition_interfaces() {
        let mut reg = InterfaceRegistry::new();
        reg.add("rx", Role::Receiver, mock("rx")).unwrap();
        reg.add("tx", Role::Sender, mock("tx")).unwrap();
        reg.add("io", Role::Both, mock("io")).unwrap();

        let rx: Vec<_> = reg.receivers().map(|e| e.name().to_string()).collect();
        let tx: Vec<_> = reg.senders().map(|e| e.name().to_string()).collect();
        assert_eq!(rx, vec!["io", "rx"]);
        assert_eq!(tx, vec!["io", "tx"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = InterfaceRegistry::new();
        reg.add("can0", Role::Both, mock("a")).unwrap();
        assert!(matches!(
            reg.add("can0", Role::Sender, mock("b")),
            Err(RegistryError::Duplicate(_))
        ));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_registration_happens_once() {
        let mut reg = InterfaceRegistry::new();
        reg.add("can0", Role::Receiver, mock("a")).unwrap();
        let entry = reg.get("can0").unwrap();
        assert!(!entry.is_registered());
        assert!(entry.mark_registered());
        assert!(!entry.mark_registered());
        assert!(entry.is_registered());
    }
}
