//! Bounce/delay/success/verify notification template expansion.
//!
//! Grounded on `bounce/bounce_template.c`. A template is a small struct of
//! headers plus a body of `$name`-bearing lines; expansion substitutes
//! `$name`, with a special case for `<param>_{seconds|minutes|hours|days|
//! weeks}` names that scale a configured time value into the requested
//! unit.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateClass {
    Fail,
    Delay,
    Success,
    Verify,
}

#[derive(Debug, Clone)]
pub struct BounceTemplate {
    pub class: TemplateClass,
    pub charset: String,
    pub mime_8bit: bool,
    pub from: String,
    pub subject: String,
    pub postmaster_subject: Option<String>,
    pub body: Vec<String>,
}

fn built_in(class: TemplateClass) -> BounceTemplate {
    let from = "MAILER-DAEMON (Mail Delivery System)".to_string();
    match class {
        TemplateClass::Fail => BounceTemplate {
            class,
            charset: "us-ascii".to_string(),
            mime_8bit: false,
            from,
            subject: "Undelivered Mail Returned to Sender".to_string(),
            postmaster_subject: Some("Postmaster Copy: Undelivered Mail".to_string()),
            body: vec![
                "This is the $mail_name program at host $myhostname.".to_string(),
                "".to_string(),
                "I'm sorry to have to inform you that your message could not".to_string(),
                "be delivered to one or more recipients. It's attached below.".to_string(),
                "".to_string(),
                "                   The $mail_name program".to_string(),
            ],
        },
        TemplateClass::Delay => BounceTemplate {
            class,
            charset: "us-ascii".to_string(),
            mime_8bit: false,
            from,
            subject: "Delayed Mail (still being retried)".to_string(),
            postmaster_subject: Some("Postmaster Warning: Delayed Mail".to_string()),
            body: vec![
                "This is the $mail_name program at host $myhostname.".to_string(),
                "".to_string(),
                "Your message could not be delivered for $delay_warning_time_hours hour(s)."
                    .to_string(),
                "It will be retried until it is $maximal_queue_lifetime_days day(s) old."
                    .to_string(),
                "".to_string(),
                "                   The $mail_name program".to_string(),
            ],
        },
        TemplateClass::Success => BounceTemplate {
            class,
            charset: "us-ascii".to_string(),
            mime_8bit: false,
            from,
            subject: "Successful Mail Delivery Report".to_string(),
            postmaster_subject: None,
            body: vec![
                "This is the $mail_name program at host $myhostname.".to_string(),
                "".to_string(),
                "Your message was successfully delivered to the destination(s)".to_string(),
                "listed below.".to_string(),
                "".to_string(),
                "                   The $mail_name program".to_string(),
            ],
        },
        TemplateClass::Verify => BounceTemplate {
            class,
            charset: "us-ascii".to_string(),
            mime_8bit: false,
            from,
            subject: "Mail Delivery Status Report".to_string(),
            postmaster_subject: None,
            body: vec![
                "This is the $mail_name program at host $myhostname.".to_string(),
                "".to_string(),
                "Enclosed is the mail delivery report that you requested.".to_string(),
                "".to_string(),
                "                   The $mail_name program".to_string(),
            ],
        },
    }
}

struct TimeDivisor {
    suffix: &'static str,
    divisor: i64,
}

const TIME_DIVISORS: &[TimeDivisor] = &[
    TimeDivisor { suffix: "seconds", divisor: 1 },
    TimeDivisor { suffix: "minutes", divisor: 60 },
    TimeDivisor { suffix: "hours", divisor: 60 * 60 },
    TimeDivisor { suffix: "days", divisor: 24 * 60 * 60 },
    TimeDivisor { suffix: "weeks", divisor: 7 * 24 * 60 * 60 },
];

/// Parameters eligible for the `_seconds`/`_hours`/... suffix expansion, in
/// their base unit (seconds).
pub struct TimeParameters<'a> {
    values: HashMap<&'a str, i64>,
}

impl<'a> TimeParameters<'a> {
    pub fn new() -> Self {
        TimeParameters {
            values: HashMap::new(),
        }
    }

    pub fn set(&mut self, name: &'a str, seconds: i64) -> &mut Self {
        self.values.insert(name, seconds);
        self
    }
}

impl<'a> Default for TimeParameters<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ExpandWarning {
    UndefinedName(String),
    ExcessiveResult { name: String, result: i64 },
    ZeroResult { name: String },
}

/// Expands `$name` references in `text` against `time_params` (the
/// `_days`/`_hours`/etc. special case) and `lookup` (everything else).
/// Returns the expanded text and any warnings encountered (the C original
/// treats these as fatal; callers here decide whether to fall back to the
/// built-in template instead of aborting the process).
pub fn expand_line(
    text: &str,
    time_params: &TimeParameters,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> (String, Vec<ExpandWarning>) {
    let mut out = String::with_capacity(text.len());
    let mut warnings = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
            {
                end += 1;
            }
            if end > start {
                let name = &text[start..end];
                out.push_str(&resolve_name(name, time_params, lookup, &mut warnings));
                i = end;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    (out, warnings)
}

fn resolve_name(
    name: &str,
    time_params: &TimeParameters,
    lookup: &dyn Fn(&str) -> Option<String>,
    warnings: &mut Vec<ExpandWarning>,
) -> String {
    for (param, seconds) in &time_params.values {
        if let Some(rest) = name.strip_prefix(*param) {
            if let Some(suffix) = rest.strip_prefix('_') {
                if let Some(div) = TIME_DIVISORS.iter().find(|d| d.suffix == suffix) {
                    let result = seconds / div.divisor;
                    if result > 999 && div.divisor < 86_400 {
                        warnings.push(ExpandWarning::ExcessiveResult {
                            name: name.to_string(),
                            result,
                        });
                    } else if result == 0 && *seconds != 0 && div.divisor > 1 {
                        warnings.push(ExpandWarning::ZeroResult {
                            name: name.to_string(),
                        });
                    }
                    return result.to_string();
                }
            }
        }
    }
    match lookup(name) {
        Some(value) => value,
        None => {
            warnings.push(ExpandWarning::UndefinedName(name.to_string()));
            String::new()
        }
    }
}

pub fn expand(
    template: &BounceTemplate,
    time_params: &TimeParameters,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> (Vec<String>, Vec<ExpandWarning>) {
    let mut lines = Vec::with_capacity(template.body.len());
    let mut warnings = Vec::new();
    for line in &template.body {
        let (expanded, mut line_warnings) = expand_line(line, time_params, lookup);
        lines.push(expanded);
        warnings.append(&mut line_warnings);
    }
    (lines, warnings)
}

pub fn fail_template() -> BounceTemplate {
    built_in(TemplateClass::Fail)
}
pub fn delay_template() -> BounceTemplate {
    built_in(TemplateClass::Delay)
}
pub fn success_template() -> BounceTemplate {
    built_in(TemplateClass::Success)
}
pub fn verify_template() -> BounceTemplate {
    built_in(TemplateClass::Verify)
}

/// Parses a user-supplied override: `Label: value` pseudo-headers, a blank
/// line, then the message body. Returns `None` (falling back to the
/// built-in template, with the caller expected to warn) on any malformed
/// input, matching the original's conservative "ignore this template"
/// behavior.
pub fn parse_override(default: &BounceTemplate, text: &str) -> Option<BounceTemplate> {
    let mut template = default.clone();
    let mut lines = text.lines();

    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        let (label, value) = line.split_once(':')?;
        let value = value.trim();
        if value.is_empty() || !value.is_ascii() {
            return None;
        }
        match label.to_ascii_lowercase().as_str() {
            "charset" => template.charset = value.to_string(),
            "from" => template.from = value.to_string(),
            "subject" => template.subject = value.to_string(),
            "postmaster-subject" => {
                if template.postmaster_subject.is_none() {
                    return None;
                }
                template.postmaster_subject = Some(value.to_string());
            }
            _ => return None,
        }
    }

    let body: Vec<String> = lines.map(|l| l.to_string()).collect();
    if body.is_empty() {
        return None;
    }
    let has_non_ascii = body.iter().any(|l| !l.is_ascii());
    if has_non_ascii {
        if template.charset.eq_ignore_ascii_case("us-ascii") {
            return None;
        }
        template.mime_8bit = true;
    }
    template.body = body;
    Some(template)
}
