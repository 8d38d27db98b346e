//! Line-oriented writer for the generated Python module.

const INDENT: &str = "    ";

/// Accumulates generated lines and tracks positions for the source map.
///
/// Hoisted definitions (synthesized `def`s for block-body arrow functions)
/// are queued and flushed immediately before the statement that needs them,
/// at the same indentation.
#[derive(Debug, Default)]
pub struct Emitter {
    lines: Vec<String>,
    indent: usize,
    hoisted: Vec<Vec<String>>,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter::default()
    }

    /// 1-based line number the next emitted line will get.
    pub fn next_line(&self) -> usize {
        self.lines.len() + 1
    }

    /// 1-based column at the current indentation.
    pub fn column(&self) -> usize {
        self.indent * INDENT.len() + 1
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn current_indent(&self) -> usize {
        self.indent
    }

    /// Emit one line at the current indentation, returning its line number.
    pub fn line(&mut self, text: &str) -> usize {
        self.flush_hoisted();
        self.push_raw(text);
        self.lines.len()
    }

    fn push_raw(&mut self, text: &str) {
        let mut line = String::new();
        if !text.is_empty() {
            for _ in 0..self.indent {
                line.push_str(INDENT);
            }
            line.push_str(text);
        }
        self.lines.push(line);
    }

    /// Queue lines (already unindented, relative) to be flushed before the
    /// next statement line.
    pub fn hoist(&mut self, lines: Vec<String>) {
        self.hoisted.push(lines);
    }

    fn flush_hoisted(&mut self) {
        let pending = std::mem::take(&mut self.hoisted);
        for block in pending {
            for line in block {
                if line.is_empty() {
                    self.lines.push(String::new());
                } else {
                    let mut indented = String::new();
                    for _ in 0..self.indent {
                        indented.push_str(INDENT);
                    }
                    indented.push_str(&line);
                    self.lines.push(indented);
                }
            }
        }
    }

    pub fn blank(&mut self) {
        self.lines.push(String::new());
    }

    pub fn finish(mut self) -> String {
        self.flush_hoisted();
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_and_indentation() {
        let mut emitter = Emitter::new();
        assert_eq!(emitter.next_line(), 1);
        emitter.line("if x:");
        emitter.indent();
        assert_eq!(emitter.column(), 5);
        emitter.line("pass");
        emitter.dedent();
        assert_eq!(emitter.finish(), "if x:\n    pass\n");
    }

    #[test]
    fn test_hoisted_lines_come_first() {
        let mut emitter = Emitter::new();
        emitter.line("a = 1");
        emitter.hoist(vec!["def _sly_arrow_0():".to_owned(), "    return 1".to_owned()]);
        emitter.line("b = _sly_arrow_0");
        assert_eq!(
            emitter.finish(),
            "a = 1\ndef _sly_arrow_0():\n    return 1\nb = _sly_arrow_0\n"
        );
    }
}
