use quick_xml::escape::escape;

use crate::model::ContentMetadata;

/// Metadata value for content types a renderer has no DIDL class for.
pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

const DIDL_OPEN: &str = concat!(
    r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" "#,
    r#"xmlns:dc="http://purl.org/dc/elements/1.1/" "#,
    r#"xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">"#
);

fn upnp_class(mime_type: &str) -> Option<&'static str> {
    let mime_type = mime_type.to_ascii_lowercase();
    if mime_type.starts_with("video/") {
        Some("object.item.videoItem.movie")
    } else if mime_type.starts_with("audio/") {
        Some("object.item.audioItem.musicTrack")
    } else if mime_type.starts_with("image/") {
        Some("object.item.imageItem.photo")
    } else {
        None
    }
}

/// DIDL-Lite `CurrentURIMetaData` describing `content_url`.
pub fn build_didl_metadata(content_url: &str, metadata: &ContentMetadata) -> String {
    let Some(class) = upnp_class(&metadata.mime_type) else {
        return NOT_IMPLEMENTED.to_string();
    };

    let size = metadata
        .size
        .map(|size| format!(r#" size="{size}""#))
        .unwrap_or_default();

    format!(
        concat!(
            "{open}",
            r#"<item id="{id}" parentID="{parent}" restricted="1">"#,
            "<dc:title>{title}</dc:title>",
            "<upnp:class>{class}</upnp:class>",
            r#"<res protocolInfo="http-get:*:{mime}:*"{size}>{url}</res>"#,
            "</item></DIDL-Lite>"
        ),
        open = DIDL_OPEN,
        id = escape(metadata.id.as_str()),
        parent = escape(metadata.parent_id.as_str()),
        title = escape(metadata.name.as_str()),
        class = class,
        mime = escape(metadata.mime_type.as_str()),
        size = size,
        url = escape(content_url),
    )
}
