use shared::{
    domain::{ClientRole, ConnectionId},
    protocol::PresenceStatus,
};

/// Single-holder role slots. A later registration of a role takes the slot
/// from the previous holder without disconnecting it.
#[derive(Debug, Default)]
pub(crate) struct PresenceRegistry {
    display: Option<ConnectionId>,
    control: Option<ConnectionId>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Registration {
    /// Connection that held the requested role until now.
    pub(crate) superseded: Option<ConnectionId>,
    /// Other role the registering connection gave up.
    pub(crate) released: Option<ClientRole>,
}

impl PresenceRegistry {
    pub(crate) fn register(&mut self, connection_id: ConnectionId, role: ClientRole) -> Registration {
        let released = match self.role_of(connection_id) {
            Some(held) if held != role => {
                *self.slot_mut(held) = None;
                Some(held)
            }
            _ => None,
        };
        let superseded = self
            .slot_mut(role)
            .replace(connection_id)
            .filter(|previous| *previous != connection_id);
        Registration {
            superseded,
            released,
        }
    }

    pub(crate) fn release(&mut self, connection_id: ConnectionId) -> Option<ClientRole> {
        let role = self.role_of(connection_id)?;
        *self.slot_mut(role) = None;
        Some(role)
    }

    pub(crate) fn holder(&self, role: ClientRole) -> Option<ConnectionId> {
        match role {
            ClientRole::Display => self.display,
            ClientRole::Control => self.control,
        }
    }

    pub(crate) fn role_of(&self, connection_id: ConnectionId) -> Option<ClientRole> {
        if self.display == Some(connection_id) {
            Some(ClientRole::Display)
        } else if self.control == Some(connection_id) {
            Some(ClientRole::Control)
        } else {
            None
        }
    }

    pub(crate) fn snapshot(&self) -> PresenceStatus {
        PresenceStatus {
            display_connected: self.display.is_some(),
            control_connected: self.control.is_some(),
        }
    }

    fn slot_mut(&mut self, role: ClientRole) -> &mut Option<ConnectionId> {
        match role {
            ClientRole::Display => &mut self.display,
            ClientRole::Control => &mut self.control,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_registration_supersedes_previous_holder() {
        let mut registry = PresenceRegistry::default();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        assert_eq!(
            registry.register(a, ClientRole::Control),
            Registration::default()
        );
        let registration = registry.register(b, ClientRole::Control);
        assert_eq!(registration.superseded, Some(a));
        assert_eq!(registry.holder(ClientRole::Control), Some(b));
        assert_eq!(registry.role_of(a), None);
    }

    #[test]
    fn re_registering_same_role_is_idempotent() {
        let mut registry = PresenceRegistry::default();
        let a = ConnectionId::new();
        registry.register(a, ClientRole::Display);
        assert_eq!(
            registry.register(a, ClientRole::Display),
            Registration::default()
        );
        assert_eq!(registry.holder(ClientRole::Display), Some(a));
    }

    #[test]
    fn switching_roles_releases_the_old_slot() {
        let mut registry = PresenceRegistry::default();
        let a = ConnectionId::new();
        registry.register(a, ClientRole::Display);
        let registration = registry.register(a, ClientRole::Control);
        assert_eq!(registration.released, Some(ClientRole::Display));
        assert_eq!(
            registry.snapshot(),
            PresenceStatus {
                display_connected: false,
                control_connected: true,
            }
        );
    }

    #[test]
    fn release_clears_only_the_slot_held() {
        let mut registry = PresenceRegistry::default();
        let display = ConnectionId::new();
        let control = ConnectionId::new();
        registry.register(display, ClientRole::Display);
        registry.register(control, ClientRole::Control);

        assert_eq!(registry.release(ConnectionId::new()), None);
        assert_eq!(registry.release(display), Some(ClientRole::Display));
        assert_eq!(
            registry.snapshot(),
            PresenceStatus {
                display_connected: false,
                control_connected: true,
            }
        );
    }

    #[test]
    fn release_of_superseded_connection_keeps_new_holder() {
        let mut registry = PresenceRegistry::default();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        registry.register(a, ClientRole::Display);
        registry.register(b, ClientRole::Display);

        assert_eq!(registry.release(a), None);
        assert_eq!(registry.holder(ClientRole::Display), Some(b));
    }
}
