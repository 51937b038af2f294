/// Lower-cases a display name into a URL slug, e.g. "Day Entry (Holiday)" -> "day-entry-holiday"
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Holiday Pass"), "holiday-pass");
        assert_eq!(slugify("Day Entry (Holiday)"), "day-entry-holiday");
        assert_eq!(slugify("  Annual  Local -- Pass "), "annual-local-pass");
        assert_eq!(slugify("Gold Star_Pass"), "gold-star-pass");
        assert_eq!(slugify("!!"), "");
    }
}
