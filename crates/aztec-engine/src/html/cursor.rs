/// A byte cursor over HTML source.
///
/// Positions are byte offsets into `s`; every token the tokenizer emits is a
/// span of these offsets so unknown markup can be sliced back out verbatim.
#[derive(Clone)]
pub struct Cursor<'a> {
    /// The source being scanned.
    pub s: &'a str,
    /// Current index into `s`.
    pub i: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    pub fn pos(&self) -> usize {
        self.i
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }

    /// Peeks at the current byte without advancing.
    pub fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.i).copied()
    }

    /// Peeks `n` bytes ahead.
    pub fn peek_at(&self, n: usize) -> Option<u8> {
        self.s.as_bytes().get(self.i + n).copied()
    }

    pub fn starts_with(&self, pat: &[u8]) -> bool {
        self.s.as_bytes()[self.i.min(self.s.len())..].starts_with(pat)
    }

    /// ASCII case-insensitive [`starts_with`](Self::starts_with).
    pub fn starts_with_ignore_case(&self, pat: &[u8]) -> bool {
        let rest = &self.s.as_bytes()[self.i.min(self.s.len())..];
        rest.len() >= pat.len() && rest[..pat.len()].eq_ignore_ascii_case(pat)
    }

    /// Advances by one byte, returning the consumed byte.
    pub fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.i += 1;
        Some(b)
    }

    /// Advances by `n` bytes, stopping at the end of input.
    pub fn bump_n(&mut self, n: usize) {
        self.i = (self.i + n).min(self.s.len());
    }

    /// Advances while `pred` holds for the current byte.
    pub fn bump_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.i += 1;
        }
    }

    /// Advances to just past the next occurrence of `pat`, or to the end of
    /// input. Returns the offset where `pat` starts, if it was found.
    pub fn skip_past(&mut self, pat: &[u8]) -> Option<usize> {
        while !self.eof() {
            if self.starts_with(pat) {
                let at = self.i;
                self.i += pat.len();
                return Some(at);
            }
            self.i += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_basics() {
        let mut cur = Cursor::new("<b>");
        assert_eq!(cur.pos(), 0);
        assert!(!cur.eof());
        assert_eq!(cur.peek(), Some(b'<'));
        assert_eq!(cur.peek_at(1), Some(b'b'));
        assert_eq!(cur.bump(), Some(b'<'));
        assert_eq!(cur.pos(), 1);
    }

    #[test]
    fn case_insensitive_prefix() {
        let cur = Cursor::new("</SCRIPT>");
        assert!(cur.starts_with_ignore_case(b"</script"));
        assert!(!cur.starts_with(b"</script"));
    }

    #[test]
    fn skip_past_finds_or_runs_out() {
        let mut cur = Cursor::new("a-->b");
        assert_eq!(cur.skip_past(b"-->"), Some(1));
        assert_eq!(cur.pos(), 4);
        assert_eq!(cur.skip_past(b"-->"), None);
        assert!(cur.eof());
    }

    #[test]
    fn bump_n_stops_at_end() {
        let mut cur = Cursor::new("hi");
        cur.bump_n(10);
        assert!(cur.eof());
        assert_eq!(cur.peek(), None);
        assert_eq!(cur.bump(), None);
    }

    #[test]
    fn bump_while_stops_on_mismatch() {
        let mut cur = Cursor::new("abc1");
        cur.bump_while(|b| b.is_ascii_alphabetic());
        assert_eq!(cur.pos(), 3);
    }
}
