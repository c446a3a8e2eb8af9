//! Static reachability and idiom mining.
//!
//! The analyzer walks the same dispatch layer as the interpreter but
//! with a processor that only watches control flow. Starting from every
//! public symbol it traces one instruction at a time, collecting
//! `(begin, len)` fragments; branch targets and fall-through offsets
//! feed the work stack, so implicit basic-block boundaries appear at
//! every branch target. A second pass fuses adjacent fragments into
//! bigrams, and byte-identical fragments are counted as one idiom.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

use bytecode::{step, BytecodeError, Cursor, Image, InstructionPrinter, Loc, Processor, Step};
use log::debug;

/// Span of one decoded instruction, or of a fused pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fragment {
    begin: usize,
    len: usize,
    /// Control transfers never fuse with their successor.
    transfer: bool,
}

/// A group of byte-identical fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Idiom {
    pub begin: usize,
    pub len: usize,
    pub count: usize,
}

/// Observes one instruction: its branch targets, whether it transfers
/// control, and whether execution can fall through past it.
#[derive(Default)]
struct EdgeScout {
    targets: Vec<usize>,
    transfer: bool,
    terminator: bool,
}

impl EdgeScout {
    fn target(&mut self, t: i32) {
        // Negative targets surface as range errors when popped.
        self.targets.push(t as usize);
    }
}

impl Processor for EdgeScout {
    type Error = BytecodeError;

    fn jmp(&mut self, _cur: &mut Cursor<'_>, target: i32) -> Result<(), BytecodeError> {
        self.transfer = true;
        self.terminator = true;
        self.target(target);
        Ok(())
    }

    fn cjmp(&mut self, _cur: &mut Cursor<'_>, target: i32, _nonzero: bool) -> Result<(), BytecodeError> {
        self.transfer = true;
        self.target(target);
        Ok(())
    }

    fn call(&mut self, _cur: &mut Cursor<'_>, target: i32, _n_args: i32) -> Result<(), BytecodeError> {
        self.transfer = true;
        self.target(target);
        Ok(())
    }

    fn callc(&mut self, _cur: &mut Cursor<'_>, _n_args: i32) -> Result<(), BytecodeError> {
        self.transfer = true;
        Ok(())
    }

    fn closure(&mut self, _cur: &mut Cursor<'_>, target: i32, _captures: &[Loc]) -> Result<(), BytecodeError> {
        self.target(target);
        Ok(())
    }

    fn end(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.transfer = true;
        self.terminator = true;
        Ok(())
    }

    fn fail(&mut self, _cur: &mut Cursor<'_>, _line: i32, _col: i32) -> Result<(), BytecodeError> {
        self.terminator = true;
        Ok(())
    }
}

/// Everything the traversal learned about an image.
pub struct Analysis {
    /// Offsets of every reached instruction, sorted.
    pub visited: Vec<usize>,
    /// Idioms sorted by count descending, ties by code bytes.
    pub idioms: Vec<Idiom>,
}

pub fn analyze(image: &Image) -> Result<Analysis, BytecodeError> {
    let mut work: Vec<usize> = image.public_offsets().collect();
    let mut visited = HashSet::new();
    let mut fragments = Vec::new();

    while let Some(at) = work.pop() {
        if !visited.insert(at) {
            continue;
        }
        let mut cur = Cursor::at(image, at)?;
        let mut scout = EdgeScout::default();
        let outcome = step(&mut cur, &mut scout)?;
        fragments.push(Fragment {
            begin: at,
            len: cur.offset() - at,
            // A stop byte neither fuses nor falls through.
            transfer: scout.transfer || outcome == Step::Halt,
        });
        for t in scout.targets {
            if !visited.contains(&t) {
                work.push(t);
            }
        }
        if !scout.terminator && outcome == Step::Continue {
            work.push(cur.offset());
        }
    }

    debug!("reached {} instructions", fragments.len());

    // Bigram pass: fuse each non-transfer fragment with the fragment
    // that starts where it ends, unless that successor is itself a
    // public entry point.
    let entries: HashSet<usize> = image.public_offsets().collect();
    let by_begin: HashMap<usize, Fragment> =
        fragments.iter().map(|f| (f.begin, *f)).collect();
    let singles = fragments.len();
    for i in 0..singles {
        let f = fragments[i];
        if f.transfer {
            continue;
        }
        let succ_off = f.begin + f.len;
        if entries.contains(&succ_off) {
            continue;
        }
        if let Some(succ) = by_begin.get(&succ_off) {
            fragments.push(Fragment {
                begin: f.begin,
                len: f.len + succ.len,
                transfer: false,
            });
        }
    }

    // Group byte-identical fragments by sorting, then run-length
    // compress the runs into counts.
    let code = image.code();
    let bytes_of = |f: &Fragment| &code[f.begin..f.begin + f.len];
    fragments.sort_by(|a, b| bytes_of(a).cmp(bytes_of(b)));

    let mut idioms: Vec<Idiom> = Vec::new();
    for f in &fragments {
        match idioms.last_mut() {
            Some(last) if code[last.begin..last.begin + last.len] == *bytes_of(f) => {
                last.count += 1;
            }
            _ => idioms.push(Idiom {
                begin: f.begin,
                len: f.len,
                count: 1,
            }),
        }
    }
    idioms.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| code[a.begin..a.begin + a.len].cmp(&code[b.begin..b.begin + b.len]))
    });

    let mut visited: Vec<usize> = visited.into_iter().collect();
    visited.sort_unstable();
    Ok(Analysis { visited, idioms })
}

/// Disassemble the one or two instructions an idiom spans.
pub fn render(image: &Image, idiom: &Idiom) -> Result<String, BytecodeError> {
    let mut cur = Cursor::at(image, idiom.begin)?;
    let mut printer = InstructionPrinter::new();
    step(&mut cur, &mut printer)?;
    if cur.offset() < idiom.begin + idiom.len {
        step(&mut cur, &mut printer)?;
    }
    Ok(printer.finish())
}

/// Print every idiom, most frequent first.
pub fn report(image: &Image, analysis: &Analysis, out: &mut dyn Write) -> io::Result<()> {
    for idiom in &analysis.idioms {
        let text = render(image, idiom)
            .unwrap_or_else(|e| format!("<undecodable: {e}>"));
        writeln!(out, "Sequence <{text}>:\n\t{} times", idiom.count)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode::ImageBuilder;

    fn image(build: impl FnOnce(&mut ImageBuilder)) -> Image {
        let mut b = ImageBuilder::new();
        b.public("main", 0);
        build(&mut b);
        Image::from_bytes(b.build()).expect("valid image")
    }

    fn idiom_bytes<'a>(image: &'a Image, idiom: &Idiom) -> &'a [u8] {
        &image.code()[idiom.begin..idiom.begin + idiom.len]
    }

    #[test]
    fn drop_dup_is_the_top_bigram() {
        // Three DROP/DUP pairs interleaved with distinct constants.
        let image = image(|b| {
            b.drop_top().dup().const_int(1);
            b.drop_top().dup().const_int(2);
            b.drop_top().dup().stop();
        });
        let analysis = analyze(&image).expect("analyzable image");

        let bigram = analysis
            .idioms
            .iter()
            .find(|i| idiom_bytes(&image, i) == [0x18, 0x19])
            .expect("the DROP/DUP bigram is an idiom");
        assert_eq!(bigram.count, 3);
        assert_eq!(render(&image, bigram).unwrap(), "DROP, DUP");

        // No other multi-instruction idiom reaches that count.
        for idiom in &analysis.idioms {
            if idiom.len > 1 && idiom_bytes(&image, idiom) != [0x18, 0x19] {
                assert!(idiom.count < 3, "unexpected idiom {idiom:?}");
            }
        }
    }

    #[test]
    fn jumped_over_bytes_are_never_visited() {
        let image = image(|b| {
            b.jmp(6);
            b.emit(&[0xEE]); // unreachable garbage at offset 5
            b.const_int(1); // offset 6
            b.stop(); // offset 11
        });
        let analysis = analyze(&image).expect("analyzable image");
        assert_eq!(analysis.visited, vec![0, 6, 11]);
    }

    #[test]
    fn every_public_symbol_seeds_the_walk() {
        let image = {
            let mut b = ImageBuilder::new();
            b.public("main", 0);
            b.public("aux", 6);
            b.jmp(12); // main jumps straight to the end
            b.emit(&[0xEE]); // offset 5, reachable from nothing
            b.const_int(2); // aux at 6
            b.stop(); // offset 11
            b.stop(); // offset 12, the jump target
            Image::from_bytes(b.build()).expect("valid image")
        };
        let analysis = analyze(&image).expect("analyzable image");
        assert_eq!(analysis.visited, vec![0, 6, 11, 12]);
    }

    #[test]
    fn fragments_never_fuse_across_an_entry_point() {
        let image = {
            let mut b = ImageBuilder::new();
            b.public("main", 0);
            b.public("aux", 1);
            b.drop_top(); // offset 0
            b.dup(); // offset 1, an entry point of its own
            b.stop();
            Image::from_bytes(b.build()).expect("valid image")
        };
        let analysis = analyze(&image).expect("analyzable image");
        assert!(
            !analysis
                .idioms
                .iter()
                .any(|i| idiom_bytes(&image, i) == [0x18, 0x19]),
            "bigram must not span the aux entry point"
        );
    }

    #[test]
    fn calls_contribute_their_target_and_fall_through() {
        let image = {
            let mut b = ImageBuilder::new();
            b.public("main", 0);
            b.call(14, 0); // 0..9
            b.jmp(15); // 9..14
            b.end_scope(); // 14
            b.stop(); // 15
            Image::from_bytes(b.build()).expect("valid image")
        };
        let analysis = analyze(&image).expect("analyzable image");
        assert_eq!(analysis.visited, vec![0, 9, 14, 15]);
    }

    #[test]
    fn unreachable_targets_error_out() {
        let image = {
            let mut b = ImageBuilder::new();
            b.public("main", 0);
            b.public("ghost", 100);
            b.stop();
            Image::from_bytes(b.build()).expect("valid image")
        };
        assert!(analyze(&image).is_err());
    }

    #[test]
    fn report_lists_counts_in_descending_order() {
        let image = image(|b| {
            b.drop_top().dup().const_int(1);
            b.drop_top().dup().const_int(2);
            b.drop_top().dup().stop();
        });
        let analysis = analyze(&image).expect("analyzable image");
        let mut out = Vec::new();
        report(&image, &analysis, &mut out).expect("report");
        let text = String::from_utf8(out).expect("utf-8 report");
        assert!(text.contains("Sequence <DROP, DUP>:\n\t3 times"));

        let counts: Vec<usize> = text
            .lines()
            .filter_map(|l| l.trim().strip_suffix(" times"))
            .filter_map(|n| n.parse().ok())
            .collect();
        let mut sorted = counts.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(counts, sorted);
    }
}
