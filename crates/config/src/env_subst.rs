/// Expand `${NAME}` placeholders from the process environment.
///
/// Unknown names are kept verbatim so a typo shows up in the loaded value.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                // Unterminated or empty placeholder: emit literally.
                out.push_str("${");
                rest = after;
            },
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "BROWSEROS_CDN" => Some("https://cdn.example.com".into()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_names() {
        assert_eq!(
            substitute_env_with("url = \"${BROWSEROS_CDN}/ext.json\"", lookup),
            "url = \"https://cdn.example.com/ext.json\""
        );
    }

    #[test]
    fn keeps_unknown_and_malformed_placeholders() {
        assert_eq!(substitute_env_with("${NOPE}", lookup), "${NOPE}");
        assert_eq!(substitute_env_with("a ${} b", lookup), "a ${} b");
        assert_eq!(substitute_env_with("tail ${OPEN", lookup), "tail ${OPEN");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(substitute_env("interval_secs = 60"), "interval_secs = 60");
    }
}
