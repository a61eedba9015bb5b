//! Splitting and packing routines behind the chunker's public contract.

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Extract the last `n` words of `text` (the whole text if shorter).
fn word_tail(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= n {
        return words.join(" ");
    }
    words[words.len() - n..].join(" ")
}

/// Split `text` at sentence boundaries (`. `, `! `, `? ` followed by an
/// uppercase letter or a newline). Returns non-empty fragments.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0;

    let mut i = 0;
    while i < bytes.len() {
        let is_terminal = bytes[i] == b'.' || bytes[i] == b'!' || bytes[i] == b'?';
        if is_terminal && i + 1 < bytes.len() && bytes[i + 1] == b' ' {
            let after_space = if i + 2 < bytes.len() {
                bytes[i + 2]
            } else {
                b'\n' // end-of-string acts like newline
            };
            if after_space.is_ascii_uppercase() || after_space == b'\n' {
                let end = i + 1; // include the terminal punctuation
                let s = text[start..end].trim();
                if !s.is_empty() {
                    sentences.push(s.to_string());
                }
                start = end + 1; // skip the space
                i = start;
                continue;
            }
        }
        i += 1;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// An indivisible piece of text, at most one budget in size.
struct Atom {
    text: String,
    /// Whether this atom started a paragraph in the source.
    para_break: bool,
}

/// Decompose into atoms no larger than `budget` words: paragraphs first,
/// oversized paragraphs by sentence, oversized sentences by word groups.
fn decompose(text: &str, budget: usize) -> Vec<Atom> {
    let mut atoms = Vec::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        if word_count(para) <= budget {
            atoms.push(Atom {
                text: para.to_string(),
                para_break: true,
            });
            continue;
        }
        let mut first = true;
        for sent in split_sentences(para) {
            if word_count(&sent) <= budget {
                atoms.push(Atom {
                    text: sent,
                    para_break: first,
                });
                first = false;
            } else {
                // No usable boundary: hard-pack by words.
                let words: Vec<&str> = sent.split_whitespace().collect();
                for group in words.chunks(budget) {
                    atoms.push(Atom {
                        text: group.join(" "),
                        para_break: first,
                    });
                    first = false;
                }
            }
        }
    }
    atoms
}

/// Word-counting split: boundary-aware packing plus overlap tails.
pub(crate) fn split_words(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    // Base chunks are budgeted below max_size so that prepending the
    // overlap tail never pushes a chunk over the limit.
    let budget = max_size - overlap;

    let mut bases: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut buf_words = 0usize;

    for atom in decompose(text, budget) {
        let n = word_count(&atom.text);
        if buf_words > 0 && buf_words + n > budget {
            bases.push(std::mem::take(&mut buf));
            buf_words = 0;
        }
        if buf.is_empty() {
            buf = atom.text;
        } else {
            buf.push_str(if atom.para_break { "\n\n" } else { " " });
            buf.push_str(&atom.text);
        }
        buf_words += n;
    }
    if !buf.is_empty() {
        bases.push(buf);
    }

    if overlap == 0 {
        return bases;
    }

    let mut out = Vec::with_capacity(bases.len());
    for (i, base) in bases.iter().enumerate() {
        if i == 0 {
            out.push(base.clone());
        } else {
            let tail = word_tail(&bases[i - 1], overlap);
            out.push(format!("{tail} {base}"));
        }
    }
    out
}

/// Character-counting split: exact windows of `max_size` chars advancing by
/// `max_size - overlap`, so each window after the first repeats the previous
/// window's last `overlap` chars. No trimming or normalization.
pub(crate) fn split_chars(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total = offsets.len();
    let step = max_size - overlap;

    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + max_size).min(total);
        let lo = offsets[start];
        let hi = if end < total { offsets[end] } else { text.len() };
        out.push(text[lo..hi].to_string());
        if end == total {
            break;
        }
        start += step;
    }
    out
}
