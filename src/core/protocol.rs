//! Messages between the host and the loader actor.
//!
//! `Action` is the closed set of host -> loader requests; `Notification`
//! is the loader -> host push. Both serialize with a `type` tag so they can
//! be logged or bridged to another process verbatim.

use serde::{Deserialize, Serialize};

use super::object_url::ObjectUrl;
use super::sections::SlotSection;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    PushSections {
        sections: Vec<SlotSection>,
    },
    #[serde(rename = "loadLQFrame")]
    LoadLqFrame { index: i32 },
    #[serde(rename = "loadHQFrame")]
    LoadHqFrame { index: i32 },
    SetFramesToLoad {
        #[serde(rename = "framesIndexes")]
        frames_indexes: Vec<i32>,
    },
    AddFramesToLoad {
        #[serde(rename = "framesIndexes")]
        frames_indexes: Vec<i32>,
    },
    SetNextFrameToLoad { index: i32 },
    Cleanup,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PushSections { .. } => "pushSections",
            Self::LoadLqFrame { .. } => "loadLQFrame",
            Self::LoadHqFrame { .. } => "loadHQFrame",
            Self::SetFramesToLoad { .. } => "setFramesToLoad",
            Self::AddFramesToLoad { .. } => "addFramesToLoad",
            Self::SetNextFrameToLoad { .. } => "setNextFrameToLoad",
            Self::Cleanup => "cleanup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "onFrameLoaded")]
    FrameLoaded {
        index: i32,
        #[serde(rename = "frameObjectURL")]
        frame_object_url: ObjectUrl,
        #[serde(rename = "isHQ")]
        is_hq: bool,
    },
    #[serde(rename = "onGetSection")]
    GetSection { index: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_wire_names() {
        let cases = [
            (Action::PushSections { sections: vec![] }, "pushSections"),
            (Action::LoadLqFrame { index: 1 }, "loadLQFrame"),
            (Action::LoadHqFrame { index: 1 }, "loadHQFrame"),
            (Action::SetFramesToLoad { frames_indexes: vec![] }, "setFramesToLoad"),
            (Action::AddFramesToLoad { frames_indexes: vec![] }, "addFramesToLoad"),
            (Action::SetNextFrameToLoad { index: 1 }, "setNextFrameToLoad"),
            (Action::Cleanup, "cleanup"),
        ];
        for (action, name) in cases {
            let value = serde_json::to_value(&action).unwrap();
            assert_eq!(value["type"], name);
            assert_eq!(action.name(), name);
        }
    }

    #[test]
    fn test_action_payload_fields() {
        let value = serde_json::to_value(Action::SetFramesToLoad {
            frames_indexes: vec![3, 4],
        })
        .unwrap();
        assert_eq!(value, json!({"type": "setFramesToLoad", "framesIndexes": [3, 4]}));

        let parsed: Action =
            serde_json::from_value(json!({"type": "setNextFrameToLoad", "index": 14})).unwrap();
        assert_eq!(parsed, Action::SetNextFrameToLoad { index: 14 });
    }

    #[test]
    fn test_notification_fields() {
        let json = r#"{"type":"onFrameLoaded","index":2,"frameObjectURL":"blob:framestream/x","isHQ":true}"#;
        let parsed: Notification = serde_json::from_str(json).unwrap();
        let Notification::FrameLoaded { index, is_hq, frame_object_url } = parsed else {
            panic!("expected onFrameLoaded");
        };
        assert_eq!((index, is_hq), (2, true));
        assert_eq!(frame_object_url.as_str(), "blob:framestream/x");

        let value = serde_json::to_value(Notification::GetSection { index: 9 }).unwrap();
        assert_eq!(value, json!({"type": "onGetSection", "index": 9}));
    }
}
