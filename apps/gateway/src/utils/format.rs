use url::Url;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Human-readable size, e.g. "1.23 GB".
pub fn format_size(size_bytes: u64) -> String {
    let (value, unit) = if size_bytes >= GB {
        (size_bytes as f64 / GB as f64, "GB")
    } else if size_bytes >= MB {
        (size_bytes as f64 / MB as f64, "MB")
    } else if size_bytes >= KB {
        (size_bytes as f64 / KB as f64, "KB")
    } else {
        (size_bytes as f64, "bytes")
    };

    format!("{:.2} {}", value, unit)
}

/// Reads `size=c<W>_u<H>` off a thumbnail URL and returns "WxH", or
/// "original" when the URL carries no size.
pub fn thumbnail_dimensions(thumbnail_url: &str) -> String {
    let size = Url::parse(thumbnail_url).ok().and_then(|url| {
        url.query_pairs()
            .find(|(k, _)| k == "size")
            .map(|(_, v)| v.into_owned())
    });

    if let Some(size) = size {
        let cleaned = size.replace('c', "");
        if let Some((width, height)) = cleaned.split_once("_u") {
            if !width.is_empty() && !height.contains("_u") {
                return format!("{}x{}", width, height);
            }
        }
    }

    "original".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(0), "0.00 bytes");
        assert_eq!(format_size(1023), "1023.00 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * MB), "5.00 MB");
        assert_eq!(format_size(168_800_237), "160.98 MB");
        assert_eq!(format_size(3 * GB / 2), "1.50 GB");
    }

    #[test]
    fn test_thumbnail_dimensions() {
        assert_eq!(
            thumbnail_dimensions("https://data.terabox.app/thumbnail/abc?fid=1&size=c850_u580&quality=100"),
            "850x580"
        );
        assert_eq!(thumbnail_dimensions("https://data.terabox.app/thumbnail/abc?fid=1"), "original");
        assert_eq!(thumbnail_dimensions("not a url"), "original");
    }
}
