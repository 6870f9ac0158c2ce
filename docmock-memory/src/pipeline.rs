//! Sort, skip and limit for query results.

use std::cmp::Ordering;
use bson::{Bson, Document};

use docmock_core::options::FindOptions;

use crate::{compare::sort_cmp, path};

/// Sorts, skips and limits `documents` per `options`, in that order.
pub fn apply(mut documents: Vec<Document>, options: &FindOptions) -> Vec<Document> {
    if let Some(spec) = &options.sort {
        sort(&mut documents, spec);
    }

    let skip = options.skip.map_or(0, |skip| usize::try_from(skip).unwrap_or(usize::MAX));
    let limit = match options.limit {
        None | Some(0) => usize::MAX,
        Some(limit) => usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX),
    };

    documents.into_iter().skip(skip).take(limit).collect()
}

/// Stable multi-key sort. A negative direction sorts that key descending.
pub fn sort(documents: &mut [Document], spec: &Document) {
    sort_by(documents, spec, |document| document);
}

/// [`sort`] over items that carry a document.
pub fn sort_by<T>(items: &mut [T], spec: &Document, document: impl Fn(&T) -> &Document) {
    let keys = spec
        .iter()
        .map(|(field, direction)| (field.as_str(), is_descending(direction)))
        .collect::<Vec<_>>();

    items.sort_by(|left, right| {
        let (left, right) = (document(left), document(right));

        keys.iter()
            .map(|(field, descending)| {
                let ordering = sort_cmp(path::resolve(left, field), path::resolve(right, field));
                if *descending { ordering.reverse() } else { ordering }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn is_descending(direction: &Bson) -> bool {
    match direction {
        Bson::Int32(n) => *n < 0,
        Bson::Int64(n) => *n < 0,
        Bson::Double(n) => *n < 0.0,
        Bson::String(s) => s.eq_ignore_ascii_case("desc") || s.eq_ignore_ascii_case("descending"),
        _ => false,
    }
}
