use parley_shared::protocol::OnlineUser;

/// Online roster. Each server push replaces it wholesale, in server order.
#[derive(Debug, Default)]
pub struct PresenceRoster {
    users: Vec<OnlineUser>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(&self) -> &[OnlineUser] {
        &self.users
    }

    pub fn replace(&mut self, users: Vec<OnlineUser>) {
        self.users = users;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::types::UserId;

    fn online(id: u64, name: &str) -> OnlineUser {
        OnlineUser {
            id: UserId(id),
            name: name.to_string(),
            email_prefix: name.to_string(),
            avatar: None,
            name_color: None,
            accessory_image: None,
        }
    }

    #[test]
    fn test_snapshot_replaces_roster() {
        let mut roster = PresenceRoster::new();
        roster.replace(vec![online(1, "mina"), online(2, "joon")]);
        roster.replace(vec![online(3, "sol")]);
        assert_eq!(roster.users().len(), 1);
        assert_eq!(roster.users()[0].name, "sol");

        roster.replace(Vec::new());
        assert!(roster.users().is_empty());
    }
}
