use crate::model::LinkType;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".webm"];

// Checked in order; first matching substring wins.
const LINK_PATTERNS: &[(LinkType, &[&str])] = &[
    (
        LinkType::Video,
        &["youtube.com", "youtu.be", "vimeo.com", "dailymotion.com", "twitch.tv", "tiktok.com"],
    ),
    (
        LinkType::Social,
        &[
            "facebook.com",
            "fb.com",
            "twitter.com",
            "x.com",
            "instagram.com",
            "linkedin.com",
            "pinterest.com",
        ],
    ),
    (
        LinkType::Image,
        &["flickr.com", "imgur.com", "unsplash.com", "pexels.com"],
    ),
    (
        LinkType::Map,
        &[
            "maps.google.com",
            "google.com/maps",
            "goo.gl/maps",
            "openstreetmap.org",
            "maps.apple.com",
            "waze.com",
        ],
    ),
    (
        LinkType::Article,
        &["wikipedia.org", "wikivoyage.org", "medium.com", "blog", "article", "news"],
    ),
    (
        LinkType::Book,
        &["goodreads.com", "amazon.com/dp", "books.google.com"],
    ),
    (
        LinkType::Movie,
        &["imdb.com", "rottentomatoes.com", "themoviedb.org"],
    ),
];

/// Direct media suffixes take precedence over the host, so a `.jpg` on a
/// video site is still an image.
pub fn classify(url: &str) -> LinkType {
    let lower = url.to_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return LinkType::Image;
    }
    if VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return LinkType::Video;
    }
    LINK_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(kind, _)| *kind)
        .unwrap_or(LinkType::Website)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_suffix_wins() {
        assert_eq!(classify("https://youtube.com/thumb.JPG"), LinkType::Image);
        assert_eq!(classify("https://example.com/a/b.jpeg"), LinkType::Image);
        assert_eq!(classify("https://cdn.example.com/clip.mp4"), LinkType::Video);
    }

    #[test]
    fn domain_table() {
        assert_eq!(classify("https://www.youtube.com/watch?v=abc"), LinkType::Video);
        assert_eq!(classify("https://instagram.com/koutoubia"), LinkType::Social);
        assert_eq!(classify("https://www.google.com/maps/place/x"), LinkType::Map);
        assert_eq!(classify("https://en.wikipedia.org/wiki/Koutoubia"), LinkType::Article);
        assert_eq!(classify("https://www.goodreads.com/book/show/1"), LinkType::Book);
        assert_eq!(classify("https://www.imdb.com/title/tt1"), LinkType::Movie);
        assert_eq!(classify("https://flickr.com/photos/1"), LinkType::Image);
    }

    #[test]
    fn unmatched_is_website() {
        assert_eq!(classify("https://example.com/page"), LinkType::Website);
    }
}
