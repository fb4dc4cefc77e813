//! Demo roster mirroring the team the dashboard ships with.

use opsdesk_core::models::{Role, User, UserId};
use opsdesk_core::MemoryStore;

pub const DEMO_PASSWORD: &str = "password";

pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    let roster = [
        (1, "admin@opsdesk.test", "Admin", Role::Admin),
        (2, "frontend@opsdesk.test", "Frontend Developer", Role::Frontend),
        (3, "medical@opsdesk.test", "Medical Advisor", Role::Medical),
        (4, "designer@opsdesk.test", "Designer", Role::Designer),
        (5, "java@opsdesk.test", "Java Developer", Role::Java),
        (6, "database@opsdesk.test", "Database Admin", Role::Database),
        (7, "homeo@opsdesk.test", "Homeo Advisor", Role::Homeo),
    ];
    for (id, email, name, role) in roster {
        store.add_user(
            User {
                id: UserId(id),
                email: email.into(),
                name: name.into(),
                avatar: format!("avatars/{id}.png"),
                role,
                is_online: false,
                last_active: None,
                last_login: None,
                unread_messages: 0,
            },
            DEMO_PASSWORD,
        );
    }
    store
}
