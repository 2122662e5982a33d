//! Split model output into prose and fenced code blocks

use serde::Serialize;

const FENCE: &str = "```";

/// A renderable piece of a model reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    Text {
        value: String,
    },
    Code {
        #[serde(skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
        value: String,
    },
}

impl Segment {
    fn text(value: &str) -> Self {
        Segment::Text {
            value: value.to_string(),
        }
    }
}

fn is_lang_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Split `content` into text and code segments, in order.
///
/// A code block is a fence, an optional language tag made of ASCII
/// letters, digits, `-` or `_`, a newline, the body, and a closing fence.
/// One trailing newline of the body is dropped. Anything that does not form
/// a complete block (an unterminated fence, `` ```c++ ``) stays text.
/// Empty content yields no segments.
pub fn parse_segments(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(offset) = content[pos..].find(FENCE) {
        let open = pos + offset;
        let after_fence = open + FENCE.len();
        let lang_len = content[after_fence..]
            .find(|c: char| !is_lang_char(c))
            .unwrap_or(content.len() - after_fence);
        let lang_end = after_fence + lang_len;

        if !content[lang_end..].starts_with('\n') {
            pos = open + 1;
            continue;
        }

        let body_start = lang_end + 1;
        let Some(body_len) = content[body_start..].find(FENCE) else {
            break;
        };
        let body_end = body_start + body_len;

        if open > text_start {
            segments.push(Segment::text(&content[text_start..open]));
        }

        let lang = &content[after_fence..lang_end];
        let body = &content[body_start..body_end];
        segments.push(Segment::Code {
            lang: (!lang.is_empty()).then(|| lang.to_string()),
            value: body.strip_suffix('\n').unwrap_or(body).to_string(),
        });

        text_start = body_end + FENCE.len();
        pos = text_start;
    }

    if text_start < content.len() {
        segments.push(Segment::text(&content[text_start..]));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(lang: Option<&str>, value: &str) -> Segment {
        Segment::Code {
            lang: lang.map(String::from),
            value: value.into(),
        }
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            parse_segments("Just text\nover two lines"),
            vec![Segment::text("Just text\nover two lines")]
        );
        assert!(parse_segments("").is_empty());
    }

    #[test]
    fn test_text_code_text() {
        let reply = "Add this to manifest.json:\n```json\n{\n  \"format_version\": 2\n}\n```\nThen reload the world.";
        assert_eq!(
            parse_segments(reply),
            vec![
                Segment::text("Add this to manifest.json:\n"),
                code(Some("json"), "{\n  \"format_version\": 2\n}"),
                Segment::text("\nThen reload the world."),
            ]
        );
    }

    #[test]
    fn test_untagged_and_hyphenated_lang() {
        let reply = "```\nplain\n``````objective-c\nint x;\n\n```";
        assert_eq!(
            parse_segments(reply),
            vec![
                code(None, "plain"),
                // Only one trailing newline is dropped
                code(Some("objective-c"), "int x;\n"),
            ]
        );
    }

    #[test]
    fn test_unterminated_fence_stays_text() {
        let partial = "Here you go:\n```javascript\nimport { world } from \"@minecraft/server\";";
        assert_eq!(parse_segments(partial), vec![Segment::text(partial)]);
    }

    #[test]
    fn test_invalid_lang_is_not_a_block() {
        let reply = "```c++\nint main() {}\n```";
        // The opener is rejected; the closing fence has no newline after it
        assert_eq!(parse_segments(reply), vec![Segment::text(reply)]);
    }

    #[test]
    fn test_multibyte_text_around_blocks() {
        let reply = "Voilà ✓\n```js\nconst é = 1;\n```fin";
        assert_eq!(
            parse_segments(reply),
            vec![
                Segment::text("Voilà ✓\n"),
                code(Some("js"), "const é = 1;"),
                Segment::text("fin"),
            ]
        );
    }

    #[test]
    fn test_serialize_shape() {
        let json = serde_json::to_value(parse_segments("```\nx\n```")).unwrap();
        assert_eq!(json, serde_json::json!([{ "type": "code", "value": "x" }]));
    }
}
