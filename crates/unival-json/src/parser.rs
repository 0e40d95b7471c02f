//! Lenient JSON parser producing unival values
//!
//! Accepts standard JSON plus the relaxed forms the runtime has always
//! read: `//` and `/* */` comments, and bare identifiers in place of
//! quoted strings. Numbers without a fraction or exponent become Int;
//! everything else numeric becomes Float. Nesting is capped so hostile
//! input cannot blow the stack.

use unival_core::{Value, VarError, VarResult};

/// Maximum container nesting depth.
const MAX_DEPTH: usize = 200;

/// Parse a JSON document into a value.
///
/// The whole input must be consumed; trailing non-garbage is an error.
pub fn parse(input: &str) -> VarResult<Value> {
    let mut parser = Parser::new(input);
    let value = parser.parse_value(0)?;
    parser.skip_garbage()?;
    if parser.pos < parser.bytes.len() {
        return Err(parser.fail(format!(
            "unexpected trailing {}",
            esc(parser.bytes[parser.pos])
        )));
    }
    Ok(value)
}

/// Renders a byte for error messages, e.g. `',' (44)`.
fn esc(byte: u8) -> String {
    if (0x20..=0x7e).contains(&byte) {
        format!("'{}' ({})", byte as char, byte)
    } else {
        format!("({byte})")
    }
}

fn is_name_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'$'
}

fn is_name_part(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$'
}

/// Parser state over the input bytes
struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn fail(&self, message: impl Into<String>) -> VarError {
        VarError::Parse {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> VarResult<()> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(self.fail(format!("expected {} but found {}", esc(byte), esc(b)))),
            None => Err(self.fail(format!("expected {} but input ended", esc(byte)))),
        }
    }

    /// Skips whitespace and both comment forms.
    fn skip_garbage(&mut self) -> VarResult<()> {
        loop {
            while let Some(b) = self.peek() {
                if b == b' ' || b == b'\t' || b == b'\n' || b == b'\r' {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if self.bytes[self.pos..].starts_with(b"//") {
                while let Some(b) = self.peek() {
                    self.pos += 1;
                    if b == b'\n' {
                        break;
                    }
                }
            } else if self.bytes[self.pos..].starts_with(b"/*") {
                let body = &self.bytes[self.pos + 2..];
                match body.windows(2).position(|w| w == b"*/") {
                    Some(end) => self.pos += 2 + end + 2,
                    None => return Err(self.fail("unterminated block comment")),
                }
            } else {
                return Ok(());
            }
        }
    }

    /// Parse any value (entry point)
    fn parse_value(&mut self, depth: usize) -> VarResult<Value> {
        self.skip_garbage()?;
        if depth > MAX_DEPTH {
            return Err(self.fail("exceeded maximum nesting depth"));
        }
        match self.peek() {
            None => Err(self.fail("unexpected end of input")),
            Some(b'"') => Ok(Value::from(self.parse_string()?)),
            Some(b'{') => self.parse_object(depth),
            Some(b'[') => self.parse_array(depth),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.parse_number(),
            Some(b) if is_name_start(b) => Ok(self.parse_word()),
            Some(b) => Err(self.fail(format!("unexpected {}", esc(b)))),
        }
    }

    /// Bare identifier: the literals map to their values, anything else is
    /// a string.
    fn parse_word(&mut self) -> Value {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_name_part(b) {
                self.pos += 1;
            } else {
                break;
            }
        }
        match &self.input[start..self.pos] {
            "true" => Value::from(true),
            "false" => Value::from(false),
            "null" => Value::null(),
            "undefined" => Value::undefined(),
            word => Value::from(word),
        }
    }

    fn next_char(&mut self) -> VarResult<char> {
        match self.input[self.pos..].chars().next() {
            Some(c) => {
                self.pos += c.len_utf8();
                Ok(c)
            }
            None => Err(self.fail("unexpected end of input in string")),
        }
    }

    fn parse_string(&mut self) -> VarResult<String> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            let c = self.next_char()?;
            match c {
                '"' => return Ok(out),
                '\\' => out.push(self.parse_escape()?),
                c if (c as u32) < 0x20 => {
                    self.pos -= 1;
                    return Err(self.fail(format!(
                        "unescaped control character {}",
                        esc(c as u8)
                    )));
                }
                c => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self) -> VarResult<char> {
        match self.next_char()? {
            '"' => Ok('"'),
            '\\' => Ok('\\'),
            '/' => Ok('/'),
            'b' => Ok('\u{8}'),
            'f' => Ok('\u{c}'),
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            'u' => self.parse_unicode_escape(),
            c => Err(self.fail(format!("invalid escape '\\{c}'"))),
        }
    }

    /// `\uXXXX`, reassembling surrogate pairs. A lone surrogate becomes
    /// U+FFFD rather than failing the document.
    fn parse_unicode_escape(&mut self) -> VarResult<char> {
        let high = self.parse_hex4()?;
        if (0xd800..=0xdbff).contains(&high) {
            if self.bytes[self.pos..].starts_with(b"\\u") {
                let mark = self.pos;
                self.pos += 2;
                let low = self.parse_hex4()?;
                if (0xdc00..=0xdfff).contains(&low) {
                    let combined = 0x10000 + ((high - 0xd800) << 10) + (low - 0xdc00);
                    return Ok(char::from_u32(combined).unwrap_or('\u{fffd}'));
                }
                // Not a low surrogate: rewind and emit a replacement for
                // the lone high surrogate.
                self.pos = mark;
            }
            return Ok('\u{fffd}');
        }
        Ok(char::from_u32(high).unwrap_or('\u{fffd}'))
    }

    fn parse_hex4(&mut self) -> VarResult<u32> {
        let mut out = 0u32;
        for _ in 0..4 {
            let c = self.next_char()?;
            let digit = c
                .to_digit(16)
                .ok_or_else(|| self.fail(format!("invalid hex digit '{c}'")))?;
            out = out * 16 + digit;
        }
        Ok(out)
    }

    /// Number parse. Int when there is no fraction or exponent and the
    /// digits fit i64, Float otherwise.
    fn parse_number(&mut self) -> VarResult<Value> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let int_start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == int_start {
            return Err(self.fail("expected a digit"));
        }
        if self.bytes[int_start] == b'0' && self.pos - int_start > 1 {
            return Err(self.fail("leading zeros are not allowed"));
        }

        let mut is_float = false;
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            let frac_start = self.pos;
            while let Some(b) = self.peek() {
                if b.is_ascii_digit() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if self.pos == frac_start {
                return Err(self.fail("expected a digit after '.'"));
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            let exp_start = self.pos;
            while let Some(b) = self.peek() {
                if b.is_ascii_digit() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if self.pos == exp_start {
                return Err(self.fail("expected a digit in exponent"));
            }
        }

        let text = &self.input[start..self.pos];
        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::from(i));
            }
            // Out of i64 range: fall through to Float.
        }
        text.parse::<f64>()
            .map(Value::from)
            .map_err(|_| self.fail(format!("invalid number {text:?}")))
    }

    fn parse_array(&mut self, depth: usize) -> VarResult<Value> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_garbage()?;
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::array(items));
        }
        loop {
            items.push(self.parse_value(depth + 1)?);
            self.skip_garbage()?;
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::array(items));
                }
                Some(b) => {
                    return Err(self.fail(format!("expected ',' or ']' but found {}", esc(b))))
                }
                None => return Err(self.fail("unterminated array")),
            }
        }
    }

    fn parse_object(&mut self, depth: usize) -> VarResult<Value> {
        self.expect(b'{')?;
        let object = Value::object_empty();
        self.skip_garbage()?;
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(object);
        }
        loop {
            self.skip_garbage()?;
            let key = match self.peek() {
                Some(b'"') => self.parse_string()?,
                // Bare keys are taken verbatim, so `true` or `null` is a
                // plain key here rather than a literal.
                Some(b) if is_name_start(b) => {
                    let start = self.pos;
                    while let Some(b) = self.peek() {
                        if is_name_part(b) {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    self.input[start..self.pos].to_string()
                }
                Some(b) => return Err(self.fail(format!("expected object key, found {}", esc(b)))),
                None => return Err(self.fail("unterminated object")),
            };
            self.skip_garbage()?;
            self.expect(b':')?;
            let value = self.parse_value(depth + 1)?;
            value_into_object(&object, key, value);
            self.skip_garbage()?;
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(object);
                }
                Some(b) => {
                    return Err(self.fail(format!("expected ',' or '}}' but found {}", esc(b))))
                }
                None => return Err(self.fail("unterminated object")),
            }
        }
    }
}

fn value_into_object(object: &Value, key: String, value: Value) {
    if let Some(o) = object.as_object() {
        o.set(key, value);
    }
}
