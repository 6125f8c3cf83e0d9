//! Image attachments: pick the images out of a message and, optionally,
//! confirm they are reachable before they are cached for the model.

use serenity::model::channel::Attachment;
use tracing::{debug, warn};

use vivi_core::ImageRef;

/// Image attachments of a message, in order, at most `max`.
pub fn image_refs(attachments: &[Attachment], max: usize) -> Vec<ImageRef> {
    select_images(
        attachments
            .iter()
            .map(|a| (a.url.as_str(), a.content_type.as_deref())),
        max,
    )
}

fn select_images<'a>(
    items: impl Iterator<Item = (&'a str, Option<&'a str>)>,
    max: usize,
) -> Vec<ImageRef> {
    items
        .filter(|(url, content_type)| !url.is_empty() && is_image(*content_type))
        .take(max)
        .map(|(url, _)| ImageRef(url.to_string()))
        .collect()
}

fn is_image(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with("image/"))
}

/// Keep only images whose URL answers a HEAD request with 200 and an
/// `image/*` content type.
pub async fn verify(client: &reqwest::Client, images: Vec<ImageRef>) -> Vec<ImageRef> {
    let mut valid = Vec::with_capacity(images.len());
    for image in images {
        match probe(client, image.url()).await {
            Ok(true) => valid.push(image),
            Ok(false) => debug!(url = image.url(), "attachment is not a reachable image"),
            Err(e) => warn!(url = image.url(), error = %e, "error validating image url"),
        }
    }
    valid
}

async fn probe(client: &reqwest::Client, url: &str) -> Result<bool, reqwest::Error> {
    let resp = client.head(url).send().await?;
    if resp.status() != reqwest::StatusCode::OK {
        return Ok(false);
    }
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    Ok(is_image(content_type))
}
