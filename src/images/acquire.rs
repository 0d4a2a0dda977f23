//! Browser-backed `ImageTransport`.
//!
//! Tier 1 opens the image URL in a side tab of the authenticated session and
//! exfiltrates bytes from inside it, trying three in-tab routes: a
//! user-script bridge when one is injected, an off-screen canvas read-back,
//! and a credentialed fetch of the tab's own location. Tier 2 runs a
//! credentialed fetch from the product page itself. Tier 3 is a plain GET
//! with the product page as referer.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{REFERER, USER_AGENT};

use crate::browser::{evaluate_json, random_user_agent, BrowserSession};
use crate::images::ImageTransport;

/// In-tab capture script. The bridge function name is the contract with the
/// optional user script installed in the profile.
const NEW_TAB_CAPTURE_JS: &str = r#"
(async () => {
  // Preferred: user-script bridge
  if (typeof window.__GET_IMAGE_BASE64__ === 'function') {
    try {
      const res = await window.__GET_IMAGE_BASE64__();
      if (res && res.ok) return res;
    } catch (e) {
      // fall through
    }
  }

  // Fallback: canvas -> dataURL
  try {
    const img = document.querySelector('img');
    if (img && img.naturalWidth && img.naturalHeight) {
      const canvas = document.createElement('canvas');
      canvas.width = img.naturalWidth;
      canvas.height = img.naturalHeight;
      const ctx = canvas.getContext('2d');
      ctx.drawImage(img, 0, 0);
      const dataUrl = canvas.toDataURL('image/png');
      return { ok: true, base64: dataUrl.split(',')[1], mime: 'image/png' };
    }
  } catch (e) {
    // fall through
  }

  // Final fallback: fetch the tab's own location with credentials
  try {
    const resp = await fetch(window.location.href, { credentials: 'include' });
    const buf = await resp.arrayBuffer();
    const bytes = new Uint8Array(buf);
    let binary = '';
    const chunk = 8192;
    for (let i = 0; i < bytes.length; i += chunk) {
      const sub = bytes.subarray(i, i + chunk);
      binary += String.fromCharCode.apply(null, sub);
    }
    const mime = resp.headers.get('content-type') || 'image/jpeg';
    return { ok: true, base64: btoa(binary), mime };
  } catch (err) {
    return { ok: false, error: String(err) };
  }
})()
"#;

pub struct BrowserTransport<'a> {
    session: &'a BrowserSession,
    http: reqwest::Client,
    referer: String,
}

impl<'a> BrowserTransport<'a> {
    pub fn new(session: &'a BrowserSession, referer: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow!("http client: {}", e))?;
        Ok(Self {
            session,
            http,
            referer: referer.into(),
        })
    }
}

/// Pull decoded bytes out of a `{ ok, base64, error? }` capture result.
fn decode_capture(value: &serde_json::Value) -> Result<Vec<u8>> {
    if value.get("ok").and_then(|v| v.as_bool()) != Some(true) {
        bail!(
            "capture reported failure: {}",
            value
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("no error detail")
        );
    }
    let b64 = value
        .get("base64")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("capture result missing base64 payload"))?;
    BASE64
        .decode(b64)
        .map_err(|e| anyhow!("capture payload not valid base64: {}", e))
}

#[async_trait]
impl ImageTransport for BrowserTransport<'_> {
    async fn fetch_new_tab(&self, url: &str) -> Result<Vec<u8>> {
        let tab = self.session.open_tab(url).await?;
        // Give the image document a moment to render before capture.
        tokio::time::sleep(Duration::from_millis(500)).await;

        let capture = evaluate_json(&tab, NEW_TAB_CAPTURE_JS).await;
        // The tab is disposable either way; never leak it.
        let _ = tab.close().await;

        decode_capture(&capture?)
    }

    async fn fetch_in_page(&self, url: &str) -> Result<Vec<u8>> {
        // URL goes in as a JSON literal so quoting is never an issue.
        let url_literal = serde_json::to_string(url)?;
        let script = format!(
            r#"
(async () => {{
  try {{
    const resp = await fetch({url_literal}, {{ credentials: 'include' }});
    const buf = await resp.arrayBuffer();
    const bytes = new Uint8Array(buf);
    let binary = '';
    const chunk = 8192;
    for (let i = 0; i < bytes.length; i += chunk) {{
      const sub = bytes.subarray(i, i + chunk);
      binary += String.fromCharCode.apply(null, sub);
    }}
    return {{ ok: true, base64: btoa(binary) }};
  }} catch (err) {{
    return {{ ok: false, error: String(err) }};
  }}
}})()
"#
        );
        let capture = evaluate_json(self.session.page(), script).await?;
        decode_capture(&capture)
    }

    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .header(REFERER, &self.referer)
            .header(USER_AGENT, random_user_agent())
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_capture_accepts_ok_payload() {
        let payload = json!({ "ok": true, "base64": BASE64.encode(b"img-bytes") });
        assert_eq!(decode_capture(&payload).unwrap(), b"img-bytes");
    }

    #[test]
    fn decode_capture_rejects_failures_with_detail() {
        let payload = json!({ "ok": false, "error": "TypeError: Failed to fetch" });
        let err = decode_capture(&payload).unwrap_err().to_string();
        assert!(err.contains("Failed to fetch"));

        let missing = json!({ "ok": true });
        assert!(decode_capture(&missing).is_err());
    }
}
