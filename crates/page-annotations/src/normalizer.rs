use annotator_core_types::Annotation;

/// Sorts `annotations` by start offset and drops every span that overlaps the
/// previously kept one. Spans sharing a start keep their input order, so the
/// first listed wins. Returns how many spans were dropped.
pub fn normalize(annotations: &mut Vec<Annotation>) -> usize {
    annotations.sort_by_key(|annotation| annotation.start);

    let before = annotations.len();
    let mut previous: Option<(usize, usize)> = None;
    annotations.retain(|annotation| {
        if let Some((start, end)) = previous {
            if start < annotation.end && end > annotation.start {
                return false;
            }
        }
        previous = Some((annotation.start, annotation.end));
        true
    });
    before - annotations.len()
}
