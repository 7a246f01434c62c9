//! UPnP AVTransport SOAP calls
//!
//! Sonos speakers expose the transport service on port 1400. Each call is a
//! POST of a SOAP envelope with a `SOAPACTION` header naming the action.

use reqwest::Client;
use std::net::SocketAddr;

use crate::{error::ControlError, Result};

/// Control path of the AVTransport service
pub const AV_TRANSPORT_PATH: &str = "/MediaRenderer/AVTransport/Control";
/// Service type used in envelopes and the `SOAPACTION` header
pub const AV_TRANSPORT_SERVICE: &str = "urn:schemas-upnp-org:service:AVTransport:1";

/// Escape text for inclusion in an XML element
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Contents of the first `<tag>...</tag>` element, if any
pub fn extract_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim())
}

fn envelope(action: &str, arguments: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
            r#"<s:Body><u:{action} xmlns:u="{service}">"#,
            "<InstanceID>0</InstanceID>{arguments}",
            "</u:{action}></s:Body></s:Envelope>"
        ),
        action = action,
        service = AV_TRANSPORT_SERVICE,
        arguments = arguments,
    )
}

/// DIDL-Lite metadata announcing the stream as a titled audio item
pub fn stream_metadata(title: &str) -> String {
    format!(
        concat!(
            r#"<DIDL-Lite xmlns:dc="http://purl.org/dc/elements/1.1/" "#,
            r#"xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/" "#,
            r#"xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/">"#,
            r#"<item id="R:0/0/0" parentID="R:0/0" restricted="true">"#,
            "<dc:title>{}</dc:title>",
            "<upnp:class>object.item.audioItem.audioBroadcast</upnp:class>",
            "</item></DIDL-Lite>"
        ),
        xml_escape(title)
    )
}

/// Body of `SetAVTransportURI`
pub fn set_transport_uri_body(uri: &str, title: &str) -> String {
    let arguments = format!(
        "<CurrentURI>{}</CurrentURI><CurrentURIMetaData>{}</CurrentURIMetaData>",
        xml_escape(uri),
        xml_escape(&stream_metadata(title))
    );
    envelope("SetAVTransportURI", &arguments)
}

/// Body of `Play`
pub fn play_body() -> String {
    envelope("Play", "<Speed>1</Speed>")
}

/// Body of `Stop`
pub fn stop_body() -> String {
    envelope("Stop", "")
}

/// Send one AVTransport action to the speaker at `addr`
pub async fn call(client: &Client, addr: SocketAddr, action: &str, body: String) -> Result<()> {
    let url = format!("http://{}{}", addr, AV_TRANSPORT_PATH);
    let response = client
        .post(&url)
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("SOAPACTION", format!(r#""{}#{}""#, AV_TRANSPORT_SERVICE, action))
        .body(body)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let text = response.text().await.unwrap_or_default();
    let detail = match extract_tag(&text, "errorCode") {
        Some(code) => format!("UPnP error {}", code),
        None => status.to_string(),
    };
    Err(ControlError::SonosError(format!("{} failed: {}", action, detail)))
}
