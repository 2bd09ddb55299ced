use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Utils,
    Qa,
    Notifications,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Utils => "utils",
            Self::Qa => "qa",
            Self::Notifications => "notifications",
        }
    }
}

/// Binds a topic to the forum thread it lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopicScope {
    pub topic: Topic,
    pub thread_id: i64,
}

impl TopicScope {
    pub fn new(topic: Topic, thread_id: i64) -> Self {
        Self { topic, thread_id }
    }

    /// Updates without a thread id (the chat's general area) never match.
    pub fn matches(&self, thread_id: Option<i64>) -> bool {
        thread_id == Some(self.thread_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopicIds {
    pub utils: i64,
    pub qa: i64,
    pub notifications: i64,
}

impl TopicIds {
    pub fn scope(&self, topic: Topic) -> TopicScope {
        let thread_id = match topic {
            Topic::Utils => self.utils,
            Topic::Qa => self.qa,
            Topic::Notifications => self.notifications,
        };
        TopicScope::new(topic, thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{Topic, TopicIds, TopicScope};

    #[test]
    fn scope_matches_only_its_own_thread() {
        let scope = TopicScope::new(Topic::Utils, 12);
        assert!(scope.matches(Some(12)));
        assert!(!scope.matches(Some(13)));
        assert!(!scope.matches(None));
    }

    #[test]
    fn topic_ids_resolve_scopes() {
        let ids = TopicIds { utils: 10, qa: 20, notifications: 30 };
        assert_eq!(ids.scope(Topic::Qa), TopicScope::new(Topic::Qa, 20));
        assert_eq!(ids.scope(Topic::Notifications).thread_id, 30);
    }
}
