//! The last-mile transformation: image substitutions over pre-rendered YAML.

use anyhow::Context;
use serde::Deserialize;
use serde_yaml::Value;

use crate::manifests;

/// Apply image substitutions to one app's combined manifests.
///
/// For every requested `<address>:<tag>`, any `image` reference whose address
/// portion (the substring before the last `:`) matches is replaced with the
/// requested reference. Returns the normalized output bytes and the subset of
/// requested images that matched something, in request order.
pub fn apply_image_substitutions(
    combined: &[u8],
    images: &[String],
) -> anyhow::Result<(Vec<u8>, Vec<String>)> {
    let substitutions: Vec<(&str, &str)> = images
        .iter()
        .map(|image| (image_address(image), image.as_str()))
        .collect();
    let mut matched = vec![false; images.len()];

    let mut docs = vec![];
    for document in serde_yaml::Deserializer::from_slice(combined) {
        let mut value =
            Value::deserialize(document).context("cannot parse pre-rendered manifests")?;
        if value.is_null() {
            continue;
        }
        substitute(&mut value, &substitutions, &mut matched);
        let bytes = serde_yaml::to_string(&value)
            .context("cannot serialize rendered manifest")?
            .into_bytes();
        docs.push(bytes);
    }

    let substituted = images
        .iter()
        .zip(matched)
        .filter_map(|(image, was_matched)| was_matched.then(|| image.clone()))
        .collect();
    Ok((manifests::combine_yaml(&docs), substituted))
}

/// The address portion of an image reference: everything before the last `:`.
fn image_address(image: &str) -> &str {
    image.rsplit_once(':').map(|(address, _)| address).unwrap_or(image)
}

fn substitute(value: &mut Value, substitutions: &[(&str, &str)], matched: &mut [bool]) {
    match value {
        Value::Mapping(mapping) => {
            for (key, item) in mapping.iter_mut() {
                if key.as_str() == Some("image")
                    && let Value::String(reference) = item
                {
                    let address = image_address(reference);
                    if let Some(pos) = substitutions
                        .iter()
                        .position(|(sub_address, _)| *sub_address == address)
                    {
                        *reference = substitutions[pos].1.to_string();
                        matched[pos] = true;
                    }
                } else {
                    substitute(item, substitutions, matched);
                }
            }
        }
        Value::Sequence(items) => {
            for item in items {
                substitute(item, substitutions, matched);
            }
        }
        _ => {}
    }
}
