//! Push notifications for illegal-zone alerts.
//!
//! Independent of the cache: a push payload becomes a notification, and a
//! click on one of its actions may open a page.

use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_TITLE: &str = "⚠️ Alerte Cadastre Minier";
const DEFAULT_BODY: &str = "Nouvelle zone illégale détectée par GEE";
const DEFAULT_URL: &str = "./index.html#alertes";
const ICON: &str = "./icon-192.png";
const TAG: &str = "alerte-mine";

/// Action that opens the notification's page.
pub const ACTION_VIEW: &str = "voir";
pub const ACTION_IGNORE: &str = "ignorer";

/// Fields a push message may carry. Everything is optional.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
  pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

impl Notification {
  /// Build the notification for a push message.
  ///
  /// Missing or unparsable data falls back to the default alert.
  pub fn from_push(data: Option<&[u8]>) -> Self {
    let payload = match data {
      Some(bytes) => serde_json::from_slice::<PushPayload>(bytes).unwrap_or_else(|e| {
        debug!(error = %e, "push payload is not JSON, using defaults");
        PushPayload::default()
      }),
      None => PushPayload::default(),
    };

    Self {
      title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      body: payload.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
      icon: ICON.to_string(),
      badge: ICON.to_string(),
      tag: TAG.to_string(),
      data: NotificationData {
        url: payload.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
      },
      actions: vec![
        NotificationAction {
          action: ACTION_VIEW.to_string(),
          title: "Voir sur la carte".to_string(),
        },
        NotificationAction {
          action: ACTION_IGNORE.to_string(),
          title: "Ignorer".to_string(),
        },
      ],
    }
  }

  /// The page to open for a selected action, if any. The notification is
  /// dismissed either way.
  pub fn on_action(&self, action: &str) -> Option<&str> {
    (action == ACTION_VIEW).then_some(self.data.url.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_push_uses_defaults() {
    let n = Notification::from_push(None);
    assert_eq!(n.title, DEFAULT_TITLE);
    assert_eq!(n.body, DEFAULT_BODY);
    assert_eq!(n.data.url, "./index.html#alertes");
    assert_eq!(n.tag, "alerte-mine");
    assert_eq!(n.icon, "./icon-192.png");
    assert_eq!(n.badge, "./icon-192.png");
    assert_eq!(n.actions.len(), 2);
    assert_eq!(n.actions[0].action, "voir");
    assert_eq!(n.actions[1].title, "Ignorer");
  }

  #[test]
  fn test_payload_fields_override_defaults() {
    let n = Notification::from_push(Some(
      &br#"{"title":"Zone 12","url":"./index.html#zone-12"}"#[..],
    ));
    assert_eq!(n.title, "Zone 12");
    assert_eq!(n.body, DEFAULT_BODY);
    assert_eq!(n.data.url, "./index.html#zone-12");
  }

  #[test]
  fn test_garbage_payload_falls_back_to_defaults() {
    let n = Notification::from_push(Some(&b"not json"[..]));
    assert_eq!(n, Notification::from_push(None));
  }

  #[test]
  fn test_only_view_action_opens_a_page() {
    let n = Notification::from_push(None);
    assert_eq!(n.on_action("voir"), Some("./index.html#alertes"));
    assert_eq!(n.on_action("ignorer"), None);
    assert_eq!(n.on_action(""), None);
  }

  #[test]
  fn test_serializes_with_nested_data() {
    let json = serde_json::to_value(Notification::from_push(None)).unwrap();
    assert_eq!(json["data"]["url"], "./index.html#alertes");
    assert_eq!(json["actions"][0]["title"], "Voir sur la carte");
  }
}
