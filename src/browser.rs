//! Browser glue: file reads, downloads, scrolling.

use js_sys::Uint8Array;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Blob, Element, File, FileList, HtmlAnchorElement, ScrollBehavior, ScrollIntoViewOptions,
    ScrollToOptions, Window,
};

use crate::image::{self, ImageMeta};

pub fn window() -> Window {
    web_sys::window().expect("window")
}

pub fn first_file(files: &FileList) -> Option<File> {
    (0..files.length()).find_map(|i| files.get(i))
}

pub fn file_meta(file: &File) -> ImageMeta {
    ImageMeta {
        name: file.name(),
        mime: file.type_(),
        size: file.size() as u64,
    }
}

async fn read_bytes(blob: &Blob) -> Result<Vec<u8>, JsValue> {
    let buf = JsFuture::from(blob.array_buffer()).await?;
    Ok(Uint8Array::new(&buf).to_vec())
}

/// Reads the first `len` bytes of a file.
pub async fn read_header(file: &File, len: u32) -> Result<Vec<u8>, JsValue> {
    let head = file.slice_with_i32_and_i32(0, len as i32)?;
    read_bytes(&head).await
}

/// Reads the whole file into a `data:` URL.
pub async fn read_data_url(file: &File, mime: &str) -> Result<String, JsValue> {
    let bytes = read_bytes(file).await?;
    Ok(image::data_url(mime, &bytes))
}

pub fn trigger_download(href: &str, filename: &str) -> Result<(), JsValue> {
    let doc = window()
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let body = doc.body().ok_or_else(|| JsValue::from_str("no body"))?;

    let a: HtmlAnchorElement = doc.create_element("a")?.dyn_into()?;
    a.set_href(href);
    a.set_download(filename);
    a.set_attribute("style", "display:none;")?;

    body.append_child(&a)?;
    a.click();
    a.remove();
    Ok(())
}

pub fn scroll_into_view(el: &Element) {
    let opts = ScrollIntoViewOptions::new();
    opts.set_behavior(ScrollBehavior::Smooth);
    el.scroll_into_view_with_scroll_into_view_options(&opts);
}

pub fn scroll_to_top() {
    let opts = ScrollToOptions::new();
    opts.set_top(0.0);
    opts.set_behavior(ScrollBehavior::Smooth);
    window().scroll_to_with_scroll_to_options(&opts);
}

pub fn now_ts() -> String {
    // ISO-ish without punctuation for filenames
    let d = js_sys::Date::new_0();
    format!(
        "{:04}{:02}{:02}-{:02}{:02}{:02}",
        d.get_full_year(),
        d.get_month() + 1,
        d.get_date(),
        d.get_hours(),
        d.get_minutes(),
        d.get_seconds()
    )
}
