const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

/// Returns the words of `text` that look like image links.
pub fn image_links(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .filter(|word| word.starts_with("http"))
        .filter(|word| {
            let lower = word.to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
        })
        .collect()
}
