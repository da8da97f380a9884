//! Body templating. `{{timestamp}}` is the only substitution supported —
//! richer templating is an explicit non-goal.

use chrono::{DateTime, Utc};

pub fn prepare_body(body_template: Option<&str>, now: DateTime<Utc>) -> Option<String> {
    let template = body_template?;
    Some(template.replace("{{timestamp}}", &now.to_rfc3339()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn substitutes_timestamp_placeholder() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let body = prepare_body(Some(r#"{"fired_at": "{{timestamp}}"}"#), now);
        assert_eq!(body.unwrap(), r#"{"fired_at": "2026-07-28T12:00:00+00:00"}"#);
    }

    #[test]
    fn no_template_yields_no_body() {
        assert_eq!(prepare_body(None, Utc::now()), None);
    }

    #[test]
    fn leaves_templates_without_the_placeholder_untouched() {
        let now = Utc::now();
        let body = prepare_body(Some("static payload"), now);
        assert_eq!(body.unwrap(), "static payload");
    }
}
