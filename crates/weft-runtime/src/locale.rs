//! Locale and timezone negotiation for `ConfigurationRequested`.

use chrono_tz::Tz;
use tracing::debug;

/// Pick the best supported locale for an `Accept-Language` style list.
///
/// Candidates are tried by descending quality. Each one matches a supported
/// tag exactly (case-insensitive) or by primary subtag (`de-AT` matches
/// `de`). Falls back to `default`.
pub fn negotiate_locale(accept_language: &str, supported: &[String], default: &str) -> String {
    let mut candidates: Vec<(&str, f32)> = accept_language
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let quality = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((tag, quality))
        })
        .collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (tag, _) in candidates {
        if let Some(exact) = supported.iter().find(|s| s.eq_ignore_ascii_case(tag)) {
            return exact.clone();
        }
        let primary = primary_subtag(tag);
        if let Some(partial) = supported
            .iter()
            .find(|s| primary_subtag(s).eq_ignore_ascii_case(primary))
        {
            return partial.clone();
        }
    }
    default.to_owned()
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

/// Parse an IANA timezone name, falling back to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            if !name.is_empty() {
                debug!(timezone = name, "unknown timezone, using UTC");
            }
            Tz::UTC
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supported() -> Vec<String> {
        vec!["en".into(), "de".into(), "pt-BR".into()]
    }

    #[test]
    fn exact_match_wins() {
        assert_eq!(negotiate_locale("pt-BR,en;q=0.5", &supported(), "en"), "pt-BR");
    }

    #[test]
    fn primary_subtag_match() {
        assert_eq!(negotiate_locale("de-AT", &supported(), "en"), "de");
    }

    #[test]
    fn quality_order_is_respected() {
        assert_eq!(negotiate_locale("en;q=0.3,de;q=0.9", &supported(), "en"), "de");
    }

    #[test]
    fn no_match_uses_default() {
        assert_eq!(negotiate_locale("fr-FR,ja", &supported(), "en"), "en");
        assert_eq!(negotiate_locale("", &supported(), "en"), "en");
        assert_eq!(negotiate_locale("*", &supported(), "de"), "de");
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(negotiate_locale("PT-br", &supported(), "en"), "pt-BR");
    }

    #[test]
    fn timezone_parsing() {
        assert_eq!(parse_timezone("Europe/Berlin"), Tz::Europe__Berlin);
        assert_eq!(parse_timezone("Mars/Olympus"), Tz::UTC);
        assert_eq!(parse_timezone(""), Tz::UTC);
    }
}
