/// Splits `text` into consecutive pieces of at most `size` characters.
///
/// Boundaries are positional (counted in `char`s), not semantic. The pieces
/// concatenate back to `text`, only the last may be shorter, and empty text
/// yields no pieces. A `size` of 0 is treated as 1.
pub fn chunk(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(text.len() / size + 1);
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if count > 0 {
        chunks.push(&text[start..]);
    }

    chunks
}
