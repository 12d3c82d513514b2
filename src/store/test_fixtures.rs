//! Entity builders shared by the store and rules tests.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::*;

pub fn user(name: &str) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4().to_string(),
        email: format!("{name}@example.com"),
        username: name.to_string(),
        password_hash: "$argon2id$test".to_string(),
        role: Role::User,
        points: 0,
        badges: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

pub fn group(name: &str, creator_id: &str) -> Group {
    let now = Utc::now();
    Group {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: None,
        creator_id: creator_id.to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub fn member(user_id: &str, group_id: &str) -> GroupMember {
    GroupMember {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        group_id: group_id.to_string(),
        role: Role::User,
        joined_at: Utc::now(),
    }
}

pub fn task(title: &str, creator_id: &str) -> Task {
    let now = Utc::now();
    Task {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        description: None,
        status: TaskStatus::Open,
        priority: TaskPriority::Medium,
        due_date: None,
        points: 10,
        creator_id: creator_id.to_string(),
        assignee_id: Some(creator_id.to_string()),
        group_id: None,
        category: None,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn notification(user_id: &str, title: &str, created_at: DateTime<Utc>) -> Notification {
    Notification {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind: NotificationKind::Reminder,
        title: title.to_string(),
        message: format!("{title} message"),
        read: false,
        task_id: None,
        created_at,
    }
}
