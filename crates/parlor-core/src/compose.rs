//! Content transforms applied while composing an outgoing message.
//!
//! Replies embed a quoted fallback of the target and an `m.in_reply_to`
//! relation. Edits wrap the new content under an `m.replace` relation and
//! mark the fallback text with `"* "`. All transforms are pure.

use parlor_proto::{
    EventId, InReplyTo, MessageContent, ReactionContent, Relation, RoomContent, RoomId,
    StateEvent,
};
use serde_json::{Map, Value};

/// Format identifier for HTML bodies.
pub const HTML_FORMAT: &str = "org.matrix.custom.html";

/// Relation type for edits.
pub const REL_REPLACE: &str = "m.replace";

/// Relation type for reactions.
pub const REL_ANNOTATION: &str = "m.annotation";

/// Plain `m.text` message.
pub fn text(body: impl Into<String>) -> MessageContent {
    with_msgtype("m.text", body)
}

/// Message with an explicit `msgtype` (`m.notice`, `m.emote`, ...).
pub fn with_msgtype(msgtype: impl Into<String>, body: impl Into<String>) -> MessageContent {
    MessageContent {
        msgtype: msgtype.into(),
        body: body.into(),
        format: None,
        formatted_body: None,
        relates_to: None,
        new_content: None,
    }
}

/// Attach an HTML rendering to a message.
#[must_use]
pub fn with_html(mut content: MessageContent, html: impl Into<String>) -> MessageContent {
    content.format = Some(HTML_FORMAT.to_owned());
    content.formatted_body = Some(html.into());
    content
}

/// Turn `content` into a reply to `target`.
pub fn reply(content: MessageContent, room_id: &RoomId, target: &StateEvent) -> MessageContent {
    let (target_body, target_html) = match target.content() {
        RoomContent::Message(message) => (
            strip_reply_fallback(&message.body),
            message
                .formatted_body
                .as_deref()
                .filter(|_| message.format.as_deref() == Some(HTML_FORMAT))
                .map(strip_html_reply_fallback),
        ),
        _ => (String::new(), None),
    };
    let sender = target.sender().as_str();

    let mut quoted = String::new();
    for (i, line) in target_body.lines().enumerate() {
        if i == 0 {
            quoted.push_str(&format!("> <{sender}> {line}\n"));
        } else {
            quoted.push_str(&format!("> {line}\n"));
        }
    }
    if quoted.is_empty() {
        quoted.push_str(&format!("> <{sender}>\n"));
    }
    let body = format!("{quoted}\n{}", content.body);

    let quoted_html = target_html.unwrap_or_else(|| html_lines(&target_body));
    let own_html = content.formatted_body.clone().unwrap_or_else(|| html_lines(&content.body));
    let event_id = target.event_id();
    let html = format!(
        "<mx-reply><blockquote>\
         <a href=\"https://matrix.to/#/{room_id}/{event_id}\">In reply to</a> \
         <a href=\"https://matrix.to/#/{sender}\">{}</a><br>\
         {quoted_html}</blockquote></mx-reply>{own_html}",
        escape_html(sender),
    );

    let mut relates_to = content.relates_to.unwrap_or_default();
    relates_to.in_reply_to = Some(InReplyTo { event_id: event_id.clone() });

    with_html(MessageContent { body, relates_to: Some(relates_to), ..content }, html)
}

/// Turn `content` into an edit of `target`.
pub fn edit(content: MessageContent, target: &EventId) -> MessageContent {
    let mut new_content = Map::new();
    new_content.insert("msgtype".to_owned(), Value::String(content.msgtype.clone()));
    new_content.insert("body".to_owned(), Value::String(content.body.clone()));
    if let (Some(format), Some(html)) = (&content.format, &content.formatted_body) {
        new_content.insert("format".to_owned(), Value::String(format.clone()));
        new_content.insert("formatted_body".to_owned(), Value::String(html.clone()));
    }

    MessageContent {
        msgtype: content.msgtype,
        body: format!("* {}", content.body),
        formatted_body: content.formatted_body.map(|html| format!("* {html}")),
        format: content.format,
        relates_to: Some(Relation {
            rel_type: Some(REL_REPLACE.to_owned()),
            event_id: Some(target.clone()),
            ..Relation::default()
        }),
        new_content: Some(Value::Object(new_content)),
    }
}

/// Annotation reaction to `target`.
pub fn reaction(target: &EventId, key: impl Into<String>) -> ReactionContent {
    ReactionContent {
        relates_to: Relation {
            rel_type: Some(REL_ANNOTATION.to_owned()),
            event_id: Some(target.clone()),
            key: Some(key.into()),
            in_reply_to: None,
        },
    }
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn html_lines(text: &str) -> String {
    escape_html(text).replace('\n', "<br>")
}

/// Drop a leading quoted reply fallback from a plain-text body.
fn strip_reply_fallback(body: &str) -> String {
    if !body.starts_with("> ") {
        return body.to_owned();
    }
    let rest: Vec<_> = body.lines().skip_while(|line| line.starts_with('>')).collect();
    rest.join("\n").trim_start_matches('\n').to_owned()
}

fn strip_html_reply_fallback(html: &str) -> String {
    match html.find("</mx-reply>") {
        Some(end) => html[end + "</mx-reply>".len()..].to_owned(),
        None => html.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parlor_proto::{OrderingKey, RawEvent, UserId, event_type};
    use serde_json::json;

    use super::*;

    fn target(content: Value) -> StateEvent {
        StateEvent::new(
            RawEvent::new(
                event_type::MESSAGE,
                None,
                UserId::new("@bob:example.org"),
                EventId::new("$target"),
                0,
                content,
            ),
            OrderingKey::new(1),
        )
    }

    #[test]
    fn reply_quotes_every_line() {
        let original = target(json!({"msgtype": "m.text", "body": "first\nsecond <b>"}));
        let content = reply(text("answer"), &RoomId::new("!r:x"), &original);

        assert_eq!(content.body, "> <@bob:example.org> first\n> second <b>\n\nanswer");
        let html = content.formatted_body.unwrap();
        assert!(html.starts_with("<mx-reply><blockquote>"));
        assert!(html.contains("first<br>second &lt;b&gt;"));
        assert!(html.ends_with("</mx-reply>answer"));
        assert_eq!(
            content.relates_to.unwrap().in_reply_to.unwrap().event_id,
            EventId::new("$target")
        );
    }

    #[test]
    fn reply_to_reply_does_not_nest_fallbacks() {
        let original = target(json!({"msgtype": "m.text", "body": "> <@c:x> old\n\nnewer"}));
        let content = reply(text("ok"), &RoomId::new("!r:x"), &original);
        assert_eq!(content.body, "> <@bob:example.org> newer\n\nok");
    }

    #[test]
    fn edit_wraps_new_content() {
        let content = edit(text("fixed"), &EventId::new("$orig"));
        assert_eq!(content.body, "* fixed");
        let relation = content.relates_to.unwrap();
        assert_eq!(relation.rel_type.as_deref(), Some(REL_REPLACE));
        assert_eq!(relation.event_id, Some(EventId::new("$orig")));
        assert_eq!(content.new_content.unwrap(), json!({"msgtype": "m.text", "body": "fixed"}));
    }

    #[test]
    fn html_survives_reply_and_edit() {
        let rich = with_html(text("*hi*"), "<em>hi</em>");
        assert_eq!(rich.format.as_deref(), Some(HTML_FORMAT));

        let original = target(json!({"msgtype": "m.text", "body": "q"}));
        let answer = reply(rich.clone(), &RoomId::new("!r:x"), &original);
        assert!(answer.formatted_body.unwrap().ends_with("</mx-reply><em>hi</em>"));

        let fixed = edit(rich, &EventId::new("$orig"));
        assert_eq!(fixed.formatted_body.as_deref(), Some("* <em>hi</em>"));
        assert_eq!(
            fixed.new_content.unwrap(),
            json!({
                "msgtype": "m.text",
                "body": "*hi*",
                "format": HTML_FORMAT,
                "formatted_body": "<em>hi</em>"
            })
        );
    }

    #[test]
    fn reaction_is_an_annotation() {
        let content = reaction(&EventId::new("$e"), "👍");
        assert_eq!(
            serde_json::to_value(content).unwrap(),
            json!({"m.relates_to": {"rel_type": "m.annotation", "event_id": "$e", "key": "👍"}})
        );
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
