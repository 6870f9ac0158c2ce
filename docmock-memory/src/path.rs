//! Dotted field paths.
//!
//! Reading resolves `a.b.c` by descending through embedded documents (and, for numeric
//! segments, arrays). A key that exists verbatim wins over the dotted interpretation. The
//! result is `None` when any segment is absent, which is distinct from a present `null`.

use bson::{Bson, Document};

use docmock_core::error::{CollectionError, CollectionResult};

/// Resolves `path` against `document`. `None` means the field is missing.
pub fn resolve<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    if let Some(value) = document.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = child(current, segment)?;
    }

    Some(current)
}

fn child<'a>(value: &'a Bson, segment: &str) -> Option<&'a Bson> {
    match value {
        Bson::Document(document) => document.get(segment),
        Bson::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index)),
        _ => None,
    }
}

/// Returns a mutable reference to the value at `path`, if present.
pub fn resolve_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    if document.contains_key(path) {
        return document.get_mut(path);
    }

    let mut segments = path.split('.');
    let mut current = document.get_mut(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(document) => document.get_mut(segment)?,
            Bson::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Most `null` elements a positional write may append to reach its index.
pub const MAX_ARRAY_PADDING: usize = 1_500_000;

/// Sets the value at `path`, creating intermediate documents as needed.
///
/// # Errors
///
/// Returns [`CollectionError::InvalidUpdate`] if an intermediate segment holds a value
/// that is neither a document nor an array, or if an array index lies more than
/// [`MAX_ARRAY_PADDING`] elements past the end of its array.
pub fn set(document: &mut Document, path: &str, value: Bson) -> CollectionResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let slot = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            set_in(slot, head, rest, value)
        }
    }
}

fn set_in(slot: &mut Bson, parent: &str, path: &str, value: Bson) -> CollectionResult<()> {
    match slot {
        Bson::Document(document) => set(document, path, value),
        Bson::Array(items) => {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            let index = head.parse::<usize>().map_err(|_| {
                CollectionError::InvalidUpdate(format!(
                    "cannot create field '{head}' in array '{parent}'"
                ))
            })?;

            if index.saturating_sub(items.len()) > MAX_ARRAY_PADDING {
                return Err(CollectionError::InvalidUpdate(format!(
                    "cannot pad array '{parent}' of length {} up to index {index}",
                    items.len()
                )));
            }
            if items.len() <= index {
                items.resize(index + 1, Bson::Null);
            }

            match rest {
                None => {
                    items[index] = value;
                    Ok(())
                }
                Some(rest) => {
                    if matches!(items[index], Bson::Null) {
                        items[index] = Bson::Document(Document::new());
                    }
                    set_in(&mut items[index], head, rest, value)
                }
            }
        }
        other => Err(CollectionError::InvalidUpdate(format!(
            "cannot create field '{path}' in element {{{parent}: {other}}}"
        ))),
    }
}

/// Removes the value at `path`, returning it if it was present.
pub fn remove(document: &mut Document, path: &str) -> Option<Bson> {
    if document.contains_key(path) {
        return document.remove(path);
    }

    let (parent, leaf) = path.rsplit_once('.')?;

    match resolve_mut(document, parent)? {
        Bson::Document(document) => document.remove(leaf),
        Bson::Array(items) => {
            let index = leaf.parse::<usize>().ok()?;
            // Arrays keep their length: the element becomes null.
            items
                .get_mut(index)
                .map(|item| std::mem::replace(item, Bson::Null))
        }
        _ => None,
    }
}
