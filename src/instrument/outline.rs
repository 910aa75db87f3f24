//! Statement outline parser for C-family fragments.
//!
//! This is not a full parser: it recognises just enough structure (classes,
//! methods, blocks, statements) to know where statements start. String, char
//! and verbatim literals, comments and preprocessor lines are skipped so
//! braces and semicolons inside them never count.

use super::{NodeKind, SyntaxNode};

/// Keywords whose `{` opens a statement block rather than an initializer.
const BLOCK_KEYWORDS: &[&str] = &[
    "if", "else", "for", "foreach", "while", "do", "switch", "using", "lock", "fixed", "try",
    "catch", "finally", "unsafe", "checked", "unchecked",
];

/// Words that continue the statement that just ended.
const CONTINUATIONS: &[&str] = &["else", "catch", "finally"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Statements,
    Members,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Semicolon,
    Brace,
    Close,
    Eof,
}

/// Parse a statement list (the body of a method).
pub fn parse_statements(text: &str) -> SyntaxNode {
    Parser::new(text).root(Context::Statements)
}

/// Parse class members (fields, methods, nested types).
pub fn parse_members(text: &str) -> SyntaxNode {
    Parser::new(text).root(Context::Members)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self { chars: text.chars().collect(), pos: 0 }
    }

    fn root(mut self, ctx: Context) -> SyntaxNode {
        let mut children = Vec::new();
        while self.pos < self.chars.len() {
            children.extend(self.items(ctx));
            // A stray `}` at top level: step over it and keep going.
            if self.peek() == Some('}') {
                self.pos += 1;
            }
        }
        SyntaxNode::new(NodeKind::Root, None).with_children(children)
    }

    fn items(&mut self, ctx: Context) -> Vec<SyntaxNode> {
        match ctx {
            Context::Statements => self.statements(),
            Context::Members => self.members(),
        }
    }

    fn statements(&mut self) -> Vec<SyntaxNode> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None | Some('}') => break,
                Some('{') => out.push(self.block(Context::Statements)),
                Some(';') => self.pos += 1,
                Some(_) => {
                    if self.skip_case_label() {
                        continue;
                    }
                    out.push(self.statement());
                }
            }
        }
        out
    }

    fn statement(&mut self) -> SyntaxNode {
        let mut node = SyntaxNode::new(NodeKind::Statement, Some(self.pos));
        let mut pending_do_while = self.peek_word().as_deref() == Some("do");
        loop {
            let (end, header) = self.scan_header();
            match end {
                End::Semicolon => self.pos += 1,
                End::Brace => {
                    if opens_block(&header) {
                        node.children.push(self.block(Context::Statements));
                    } else {
                        let local_function = is_local_function(&header);
                        self.skip_balanced();
                        if local_function {
                            break;
                        }
                        continue;
                    }
                }
                End::Close | End::Eof => break,
            }
            self.skip_trivia();
            match self.peek_word().as_deref() {
                Some(w) if CONTINUATIONS.contains(&w) => continue,
                Some("while") if pending_do_while => {
                    pending_do_while = false;
                    continue;
                }
                _ => break,
            }
        }
        node
    }

    fn members(&mut self) -> Vec<SyntaxNode> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None | Some('}') => break,
                Some(';') => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }
            let start = self.pos;
            let (end, header) = self.scan_header();
            match end {
                End::Semicolon => self.pos += 1,
                End::Close | End::Eof => break,
                End::Brace => {
                    if let Some(name) = type_name(&header) {
                        self.pos += 1;
                        let children = self.members();
                        self.close();
                        out.push(
                            SyntaxNode::new(NodeKind::Class { name }, Some(start)).with_children(children),
                        );
                    } else if has_word(&header, &["enum", "interface"]) || is_initializer(&header) {
                        self.skip_balanced();
                        self.finish_member();
                    } else if let Some(name) = method_name(&header) {
                        let body = self.block(Context::Statements);
                        out.push(
                            SyntaxNode::new(NodeKind::Method { name }, Some(start)).with_children(vec![body]),
                        );
                    } else {
                        // property accessors
                        self.skip_balanced();
                        self.skip_trivia();
                        if self.peek() == Some('=') {
                            self.finish_member();
                        }
                    }
                }
            }
        }
        out
    }

    /// Skip the rest of a member declaration up to its `;`.
    fn finish_member(&mut self) {
        loop {
            let (end, _) = self.scan_header();
            match end {
                End::Semicolon => {
                    self.pos += 1;
                    return;
                }
                End::Brace => self.skip_balanced(),
                End::Close | End::Eof => return,
            }
        }
    }

    fn block(&mut self, ctx: Context) -> SyntaxNode {
        let start = self.pos;
        self.pos += 1;
        let children = self.items(ctx);
        self.close();
        SyntaxNode::new(NodeKind::Block, Some(start)).with_children(children)
    }

    fn close(&mut self) {
        if self.peek() == Some('}') {
            self.pos += 1;
        }
    }

    /// Scan up to the next `;`, `{` or `}` outside parentheses. The returned
    /// header has comments dropped and literals collapsed to `""`.
    fn scan_header(&mut self) -> (End, String) {
        let mut header = String::new();
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            if self.skip_comment() {
                header.push(' ');
                continue;
            }
            if self.skip_literal() {
                header.push_str("\"\"");
                continue;
            }
            match c {
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                ';' if depth == 0 => return (End::Semicolon, header),
                '{' if depth == 0 => return (End::Brace, header),
                '}' if depth == 0 => return (End::Close, header),
                '{' => {
                    self.skip_balanced();
                    header.push_str("{}");
                    continue;
                }
                _ => {}
            }
            header.push(c);
            self.pos += 1;
        }
        (End::Eof, header)
    }

    fn skip_case_label(&mut self) -> bool {
        match self.peek_word().as_deref() {
            Some("case") => {}
            Some("default") => {
                let save = self.pos;
                self.pos += "default".len();
                self.skip_trivia();
                if self.peek() != Some(':') {
                    self.pos = save;
                    return false;
                }
            }
            _ => return false,
        }
        while let Some(c) = self.peek() {
            if self.skip_comment() || self.skip_literal() {
                continue;
            }
            self.pos += 1;
            if c == ':' {
                if self.peek() == Some(':') {
                    self.pos += 1;
                    continue;
                }
                break;
            }
        }
        true
    }

    /// Skip a `{ ... }` group, literals and comments included.
    fn skip_balanced(&mut self) {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            if self.skip_comment() || self.skip_literal() {
                continue;
            }
            self.pos += 1;
            match c {
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += 1,
                Some('#') if self.at_line_start() => self.skip_line(),
                Some('/') => {
                    if !self.skip_comment() {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn skip_comment(&mut self) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Some('/'), Some('/')) => {
                self.skip_line();
                true
            }
            (Some('/'), Some('*')) => {
                self.pos += 2;
                while self.pos < self.chars.len() {
                    if self.peek() == Some('*') && self.peek_at(1) == Some('/') {
                        self.pos += 2;
                        return true;
                    }
                    self.pos += 1;
                }
                true
            }
            _ => false,
        }
    }

    fn skip_literal(&mut self) -> bool {
        let (verbatim, skip) = match (self.peek(), self.peek_at(1), self.peek_at(2)) {
            (Some('"'), _, _) => (false, 1),
            (Some('@'), Some('"'), _) => (true, 2),
            (Some('$'), Some('"'), _) => (false, 2),
            (Some('$'), Some('@'), Some('"')) | (Some('@'), Some('$'), Some('"')) => (true, 3),
            (Some('\''), _, _) => {
                self.skip_quoted('\'');
                return true;
            }
            _ => return false,
        };
        self.pos += skip;
        if verbatim {
            while let Some(c) = self.peek() {
                self.pos += 1;
                if c == '"' {
                    if self.peek() == Some('"') {
                        self.pos += 1;
                        continue;
                    }
                    break;
                }
            }
        } else {
            self.pos -= 1;
            self.skip_quoted('"');
        }
        true
    }

    /// Skip a single-line quoted literal starting at the opening quote.
    fn skip_quoted(&mut self, quote: char) {
        self.pos += 1;
        while let Some(c) = self.peek() {
            match c {
                '\\' => self.pos += 2,
                '\n' => return,
                c if c == quote => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                break;
            }
        }
    }

    fn at_line_start(&self) -> bool {
        self.chars[..self.pos]
            .iter()
            .rev()
            .take_while(|c| **c != '\n')
            .all(|c| c.is_whitespace())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn peek_word(&self) -> Option<String> {
        let word: String = self.chars[self.pos.min(self.chars.len())..]
            .iter()
            .take_while(|c| is_ident(**c))
            .collect();
        (!word.is_empty()).then_some(word)
    }
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '@'
}

fn words(header: &str) -> impl Iterator<Item = &str> {
    header.split(|c: char| !is_ident(c)).filter(|w| !w.is_empty())
}

fn has_word(header: &str, candidates: &[&str]) -> bool {
    words(header).any(|w| candidates.contains(&w))
}

fn opens_block(header: &str) -> bool {
    words(header)
        .next()
        .map(|w| BLOCK_KEYWORDS.contains(&w))
        .unwrap_or(false)
}

fn is_initializer(header: &str) -> bool {
    let trimmed = header.trim_end();
    trimmed.ends_with("=>") || matches!(trimmed.chars().last(), Some('=' | ',' | '(' | '['))
}

/// `int Add(int a, int b)` followed by a body, as opposed to a call or
/// constructor followed by an initializer.
fn is_local_function(header: &str) -> bool {
    let trimmed = header.trim_end();
    trimmed.ends_with(')')
        && !trimmed.contains('=')
        && !has_word(trimmed, &["new", "return", "throw", "yield", "await"])
}

fn type_name(header: &str) -> Option<String> {
    let mut it = words(header);
    while let Some(w) = it.next() {
        if matches!(w, "class" | "struct" | "namespace") {
            return it.next().map(str::to_string);
        }
    }
    None
}

fn method_name(header: &str) -> Option<String> {
    let paren = header.find('(')?;
    if header[..paren].contains('=') {
        return None;
    }
    let name: String = header[..paren]
        .trim_end()
        .chars()
        .rev()
        .take_while(|c| is_ident(*c))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{is_helper, statement_offsets};

    fn offsets_of(text: &str, needles: &[&str]) -> Vec<usize> {
        needles
            .iter()
            .map(|n| text.find(n).unwrap_or_else(|| panic!("missing {n}")))
            .collect()
    }

    #[test]
    fn statements_with_blocks_and_else_chains() {
        let text = "var a = 1;\nif (a > 0)\n{\n    Console.WriteLine(a);\n}\nelse\n    a--;\nvar list = new List<int> { 1, 2 };\n";
        let tree = parse_statements(text);
        assert_eq!(
            statement_offsets(&tree, &is_helper),
            offsets_of(text, &["var a", "if (", "Console", "var list"])
        );
    }

    #[test]
    fn literals_and_comments_do_not_split_statements() {
        let text = "var s = \"a; b { c\"; // x; y {\nvar t = @\"q\"\"; {\"; /* ; */ var c = ';';";
        let tree = parse_statements(text);
        assert_eq!(
            statement_offsets(&tree, &is_helper),
            offsets_of(text, &["var s", "var t", "var c"])
        );
    }

    #[test]
    fn for_headers_and_lambdas_stay_in_one_statement() {
        let text = "for (int i = 0; i < 3; i++) { Foo(i); }\nitems.ForEach(x => { Bar(x); });\ndo { n++; } while (n < 3);\nDone();";
        let tree = parse_statements(text);
        assert_eq!(
            statement_offsets(&tree, &is_helper),
            offsets_of(text, &["for (", "Foo(i)", "items.", "do {", "n++", "Done"])
        );
    }

    #[test]
    fn switch_case_labels_are_not_statements() {
        let text = "switch (x)\n{\n    case 1:\n        A();\n        break;\n    default:\n        B();\n        break;\n}";
        let tree = parse_statements(text);
        let offsets = statement_offsets(&tree, &is_helper);
        assert_eq!(offsets.len(), 5);
        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[1], text.find("A()").unwrap());
        assert_eq!(offsets[3], text.find("B()").unwrap());
    }

    #[test]
    fn program_members_track_only_method_bodies() {
        let text = "int counter = 5;\nint[] seeds = { 1, 2 };\nint Count { get { return counter; } }\nvoid Main()\n{\n    counter++;\n    Helper().Dump();\n}\nstring Helper() { return \"x\"; }\n";
        let tree = parse_members(text);
        assert_eq!(
            statement_offsets(&tree, &is_helper),
            offsets_of(text, &["counter++", "Helper().Dump", "return \"x\""])
        );
    }

    #[test]
    fn helper_class_and_tracking_method_are_skipped() {
        let text = "public static class DumpHelpers\n{\n    public static int LastOffset;\n    public static void ____TrackStatementOffset(int offset)\n    {\n        LastOffset = offset;\n    }\n}\nclass Other\n{\n    void Run() { Go(); }\n}\n";
        let tree = parse_members(text);
        assert_eq!(statement_offsets(&tree, &is_helper), offsets_of(text, &["Go()"]));
    }

    #[test]
    fn local_function_ends_before_next_statement() {
        let text = "int Add(int a, int b) { return a + b; }\nvar x = Add(1, 2);\nx.Dump();";
        let tree = parse_statements(text);
        assert_eq!(statement_offsets(&tree, &is_helper), vec![0, 40, 59]);
    }

    #[test]
    fn returned_initializer_stays_in_its_statement() {
        let text = "return new Point() { X = 1 };\nDone();";
        let tree = parse_statements(text);
        assert_eq!(statement_offsets(&tree, &is_helper), offsets_of(text, &["return", "Done"]));
    }

    #[test]
    fn unterminated_statement_still_counts() {
        let tree = parse_statements("  Foo()");
        assert_eq!(statement_offsets(&tree, &is_helper), vec![2]);
    }
}
