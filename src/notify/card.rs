//! Interactive message card for run results.

use serde_json::{json, Value};

use super::NotificationResult;
use crate::etl::SyncMode;

const TITLE: &str = "工时数据收集转换写入任务";

fn mode_label(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::Full => "全量模式",
        SyncMode::Incremental => "增量模式",
    }
}

fn markdown(content: String) -> Value {
    json!({
        "tag": "div",
        "text": {"tag": "lark_md", "content": content},
    })
}

/// Render the card body (the `card` object of a webhook message).
#[must_use]
pub fn build_card(result: &NotificationResult) -> Value {
    let (icon, color, status) = if result.success {
        ("✅", "green", "执行成功")
    } else {
        ("❌", "red", "执行失败")
    };

    let mut elements = vec![
        markdown(format!(
            "**执行模式**: {}\n**开始时间**: {}\n**耗时**: {:.2}秒\n",
            mode_label(result.mode),
            result.start_time.format("%Y-%m-%d %H:%M:%S"),
            result.duration.as_secs_f64(),
        )),
        json!({"tag": "hr"}),
        markdown(format!("**结果信息**: {}", result.message)),
    ];
    if !result.details.is_empty() {
        elements.push(markdown(format!("**详细数据**: {}", result.details)));
    }

    json!({
        "config": {"wide_screen_mode": true},
        "header": {
            "title": {
                "tag": "plain_text",
                "content": format!("{icon} {TITLE}--{status}"),
                "color": color,
            }
        },
        "elements": elements,
    })
}

/// Body for a custom-bot webhook.
#[must_use]
pub fn webhook_message(card: &Value) -> Value {
    json!({"msg_type": "interactive", "card": card})
}

/// Body for the app-bot message API; the card travels as a JSON string.
#[must_use]
pub fn chat_message(chat_id: &str, card: &Value) -> Value {
    json!({
        "receive_id": chat_id,
        "msg_type": "interactive",
        "content": card.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::time::Duration;

    fn result(success: bool, details: &str) -> NotificationResult {
        NotificationResult {
            success,
            mode: SyncMode::Incremental,
            duration: Duration::from_millis(12_340),
            start_time: Local.with_ymd_and_hms(2024, 1, 8, 9, 30, 0).unwrap(),
            message: if success { "数据同步完成".into() } else { "boom".into() },
            details: details.into(),
        }
    }

    #[test]
    fn test_success_card() {
        let card = build_card(&result(true, "抽取记录: 3 条"));

        assert_eq!(card["header"]["title"]["color"], "green");
        assert_eq!(card["header"]["title"]["content"], "✅ 工时数据收集转换写入任务--执行成功");
        assert_eq!(card["config"]["wide_screen_mode"], true);

        let elements = card["elements"].as_array().unwrap();
        assert_eq!(elements.len(), 4);
        let summary = elements[0]["text"]["content"].as_str().unwrap();
        assert!(summary.contains("**执行模式**: 增量模式"));
        assert!(summary.contains("**开始时间**: 2024-01-08 09:30:00"));
        assert!(summary.contains("**耗时**: 12.34秒"));
        assert_eq!(elements[1]["tag"], "hr");
        assert_eq!(elements[3]["text"]["content"], "**详细数据**: 抽取记录: 3 条");
    }

    #[test]
    fn test_failure_card_without_details() {
        let card = build_card(&result(false, ""));

        assert_eq!(card["header"]["title"]["color"], "red");
        assert!(card["header"]["title"]["content"].as_str().unwrap().starts_with("❌"));
        let elements = card["elements"].as_array().unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[2]["text"]["content"], "**结果信息**: boom");
    }

    #[test]
    fn test_message_envelopes() {
        let card = build_card(&result(true, ""));

        let hook = webhook_message(&card);
        assert_eq!(hook["msg_type"], "interactive");
        assert_eq!(hook["card"], card);

        let chat = chat_message("oc_123", &card);
        assert_eq!(chat["receive_id"], "oc_123");
        let embedded: Value = serde_json::from_str(chat["content"].as_str().unwrap()).unwrap();
        assert_eq!(embedded, card);
    }
}
