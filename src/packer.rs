//! Dean Edwards style `eval(function(p,a,c,k,e,d){...}(...))` packer.
//!
//! The packed call carries a payload whose identifiers were replaced by
//! base-N token names plus a `|`-joined dictionary mapping each token index
//! back to the original word. Decoding is done directly here, without
//! evaluating any script.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ResolveError;
use crate::util;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Past base 62 the `d + 29` digits stop being word characters, so their
/// tokens cannot be matched on word boundaries.
const MAX_RADIX: u32 = 62;

fn signature() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"eval\s*\(\s*function\s*\(\s*p\s*,\s*a\s*,\s*c\s*,\s*k\s*,\s*e\s*,\s*[dr]\s*\)").unwrap()
    })
}

fn malformed<S: Into<String>>(reason: S) -> ResolveError {
    ResolveError::MalformedPackerArguments(reason.into())
}

/// Finds the first packed call in `html` and returns it from `eval` through
/// its balanced closing paren.
pub fn detect(html: &str) -> Result<&str, ResolveError> {
    let m = signature().find(html).ok_or(ResolveError::ObfuscationNotFound)?;
    let open = m.start() + m.as_str().find('(').ok_or(ResolveError::ObfuscationNotFound)?;
    let close = matching_close(html, open, b'(', b')')
        .ok_or_else(|| malformed("packed call is never closed"))?;
    Ok(&html[m.start()..=close])
}

/// Byte index of the bracket closing the one at `open`, skipping over quoted
/// string literals.
fn matching_close(src: &str, open: usize, open_ch: u8, close_ch: u8) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' || b == b'`' {
                    quote = Some(b);
                } else if b == open_ch {
                    depth += 1;
                } else if b == close_ch {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
            }
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    /// `0-9a-z`, what `Number.prototype.toString(radix)` produces.
    Radix36,
    /// Digits past 35 become `String.fromCharCode(d + 29)`, i.e. `A-Z` up to base 62.
    Extended,
}

/// Arguments of one packed call.
#[derive(Debug, Clone)]
pub struct ObfuscatedScript {
    pub payload: String,
    pub radix: u32,
    pub token_count: usize,
    pub dictionary: Vec<String>,
    /// The unpacker body defines its own base conversion (`fromCharCode(c+29)`).
    pub custom_encoder: bool,
    /// The unpacker body swaps in a `\w+` single-pass decoder.
    pub word_decoder: bool,
}

impl ObfuscatedScript {
    /// Parses the call text returned by [`detect`].
    pub fn parse(call: &str) -> Result<Self, ResolveError> {
        let m = signature().find(call).ok_or(ResolveError::ObfuscationNotFound)?;
        let mut args = Cursor::new(call, m.end());

        args.skip_ws();
        if !args.rest().starts_with('{') {
            return Err(malformed("unpacker function has no body"));
        }
        let body_start = args.pos;
        let body_end = matching_close(call, body_start, b'{', b'}')
            .ok_or_else(|| malformed("unpacker body is never closed"))?;
        let body = &call[body_start..=body_end];
        args.pos = body_end + 1;

        args.expect('(', "argument list")?;
        let payload = args.string("payload")?;
        args.expect(',', "radix")?;
        let radix = args.radix()?;
        args.expect(',', "token count")?;
        let token_count = args.integer("token count")? as usize;
        args.expect(',', "dictionary")?;
        let words = args.string("dictionary")?;
        let delimiter = args.split_delimiter()?;

        if !(2..=MAX_RADIX).contains(&radix) {
            return Err(malformed(format!("radix {radix} out of range")));
        }
        let dictionary: Vec<String> = words.split(delimiter.as_str()).map(String::from).collect();
        if dictionary.len() != token_count {
            return Err(malformed(format!(
                "dictionary has {} entries, expected {}",
                dictionary.len(),
                token_count
            )));
        }

        Ok(ObfuscatedScript {
            payload,
            radix,
            token_count,
            dictionary,
            custom_encoder: body.contains("fromCharCode"),
            word_decoder: body.contains(r"\\w+"),
        })
    }

    pub fn alphabet(&self) -> Alphabet {
        if self.radix > 36 {
            Alphabet::Extended
        } else {
            Alphabet::Radix36
        }
    }

    /// Substitutes dictionary words back into the payload.
    ///
    /// Indices are walked from highest to lowest so that a short token such
    /// as `1` is never applied before a longer one such as `10`.
    pub fn decode(&self) -> String {
        let mut text = self.payload.clone();
        for index in (0..self.token_count).rev() {
            let word = &self.dictionary[index];
            if word.is_empty() {
                continue;
            }
            let token = token_name(index, self.radix);
            text = replace_whole_word(&text, &token, word);
        }
        text
    }
}

/// Detects, parses and decodes the packed call embedded in a page.
pub fn unpack(html: &str) -> Result<String, ResolveError> {
    let call = detect(html)?;
    let script = ObfuscatedScript::parse(call)?;
    util::debug(format!(
        "packer: radix={} tokens={} alphabet={:?} encoder={} decoder={}",
        script.radix,
        script.token_count,
        script.alphabet(),
        script.custom_encoder,
        script.word_decoder
    ));
    Ok(script.decode())
}

/// Renders `index` the way the packer named its tokens.
pub fn token_name(index: usize, radix: u32) -> String {
    let radix = radix as usize;
    let mut rest = index;
    let mut digits = Vec::new();
    loop {
        digits.push(digit_char(rest % radix));
        rest /= radix;
        if rest == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

fn digit_char(digit: usize) -> char {
    match DIGITS.get(digit) {
        Some(&d) => d as char,
        None => char::from_u32(digit as u32 + 29).unwrap_or('?'),
    }
}

fn replace_whole_word(haystack: &str, token: &str, word: &str) -> String {
    // ASCII boundaries, as `\b` behaves in the unpacker's own RegExp.
    match Regex::new(&format!(r"(?-u:\b){}(?-u:\b)", regex::escape(token))) {
        Ok(re) => re.replace_all(haystack, regex::NoExpand(word)).into_owned(),
        Err(_) => haystack.to_string(),
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Cursor { src, pos }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char, before: &str) -> Result<(), ResolveError> {
        self.skip_ws();
        if self.rest().starts_with(ch) {
            self.pos += ch.len_utf8();
            Ok(())
        } else {
            Err(malformed(format!("expected '{ch}' before {before}")))
        }
    }

    fn integer(&mut self, what: &str) -> Result<u32, ResolveError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if len == 0 {
            return Err(malformed(format!("{what} is not an integer literal")));
        }
        let value = rest[..len]
            .parse::<u32>()
            .map_err(|e| malformed(format!("{what}: {e}")))?;
        self.pos += len;
        Ok(value)
    }

    fn radix(&mut self) -> Result<u32, ResolveError> {
        // Some packers pass `[]` and fall back to base 62.
        if self.eat("[]") {
            return Ok(62);
        }
        self.integer("radix")
    }

    fn split_delimiter(&mut self) -> Result<String, ResolveError> {
        if !self.eat(".split") {
            return Err(malformed("dictionary is not a split string"));
        }
        self.expect('(', "split delimiter")?;
        let delimiter = self.string("split delimiter")?;
        self.expect(')', "remaining arguments")?;
        if delimiter.is_empty() {
            return Err(malformed("empty dictionary delimiter"));
        }
        Ok(delimiter)
    }

    /// Reads a quoted JS string literal, resolving escapes.
    fn string(&mut self, what: &str) -> Result<String, ResolveError> {
        self.skip_ws();
        let rest = self.rest();
        let mut chars = rest.char_indices();
        let quote = match chars.next() {
            Some((_, q @ ('\'' | '"'))) => q,
            _ => return Err(malformed(format!("{what} is not a string literal"))),
        };
        let mut out = String::new();
        while let Some((i, ch)) = chars.next() {
            if ch == quote {
                self.pos += i + ch.len_utf8();
                return Ok(out);
            }
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '\n')) => {}
                Some((_, 'x')) => out.push(hex_escape(&mut chars, 2, what)?),
                Some((_, 'u')) => out.push(hex_escape(&mut chars, 4, what)?),
                Some((_, other)) => out.push(other),
                None => break,
            }
        }
        Err(malformed(format!("{what} string literal is never closed")))
    }
}

fn hex_escape(chars: &mut std::str::CharIndices<'_>, len: usize, what: &str) -> Result<char, ResolveError> {
    let hex: String = chars.by_ref().take(len).map(|(_, c)| c).collect();
    u32::from_str_radix(&hex, 16)
        .ok()
        .filter(|_| hex.len() == len)
        .and_then(char::from_u32)
        .ok_or_else(|| malformed(format!("bad \\x/\\u escape in {what}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(payload: &str, radix: u32, count: usize, dictionary: &str) -> String {
        format!(
            "eval(function(p,a,c,k,e,d){{while(c--)if(k[c])p=p.replace(new RegExp('\\\\b'+c.toString(a)+'\\\\b','g'),k[c]);return p}}('{payload}',{radix},{count},'{dictionary}'.split('|'),0,{{}}))"
        )
    }

    #[test]
    fn empty_dictionary_entry_leaves_token_alone() {
        let call = packed("0(1,2)", 36, 3, "foo|bar|");
        let script = ObfuscatedScript::parse(&call).unwrap();
        assert_eq!(script.dictionary, ["foo", "bar", ""]);
        assert_eq!(script.decode(), "foo(bar,2)");
    }

    #[test]
    fn longer_token_is_not_corrupted_by_shorter_one() {
        // radix 10 so that index 10 is named "10"
        let mut words = vec![""; 11];
        words[1] = "X";
        words[10] = "Y";
        let call = packed("1 10 100 1", 10, 11, &words.join("|"));
        let decoded = unpack(&call).unwrap();
        assert_eq!(decoded, "X Y 100 X");
        assert!(!decoded.contains("X0"));
    }

    #[test]
    fn decodes_e_r_variant_with_word_decoder() {
        let page = r#"<script>eval(function(p,a,c,k,e,r){e=String;if(!''.replace(/^/,String)){while(c--)r[c]=k[c]||c;k=[function(e){return r[e]}];e=function(){return'\\w+'};c=1};while(c--)if(k[c])p=p.replace(new RegExp('\\b'+e(c)+'\\b','g'),k[c]);return p}('1 0=2;3(0)',4,4,'x|var|5|alert'.split('|'),0,{}))</script>"#;
        let call = detect(page).unwrap();
        assert!(call.starts_with("eval(function(p,a,c,k,e,r)"));
        assert!(call.ends_with("{}))"));
        let script = ObfuscatedScript::parse(call).unwrap();
        assert!(script.word_decoder);
        assert!(!script.custom_encoder);
        assert_eq!(script.decode(), "var x=5;alert(x)");
    }

    #[test]
    fn detection_skips_parens_inside_string_literals() {
        let call = packed(r"0(\')\')", 36, 1, "alert");
        let page = format!("<html><script>{call}</script><p>(not part)</p></html>");
        let found = detect(&page).unwrap();
        assert_eq!(found, call);
        assert_eq!(unpack(&page).unwrap(), "alert(')')");
    }

    #[test]
    fn detection_failures_are_typed() {
        assert!(matches!(
            detect("<html><script>var x = 1;</script></html>"),
            Err(ResolveError::ObfuscationNotFound)
        ));
        assert!(matches!(
            detect("eval(function(p,a,c,k,e,d){return p}('0',10,1,'x'.split('|')"),
            Err(ResolveError::MalformedPackerArguments(_))
        ));
    }

    #[test]
    fn rejects_malformed_literals() {
        let bad_radix = "eval(function(p,a,c,k,e,d){return p}('0',a,1,'x'.split('|'),0,{}))";
        assert!(matches!(
            ObfuscatedScript::parse(bad_radix),
            Err(ResolveError::MalformedPackerArguments(msg)) if msg.contains("radix")
        ));

        let short_dictionary = packed("0 1", 36, 3, "a|b");
        assert!(matches!(
            ObfuscatedScript::parse(&short_dictionary),
            Err(ResolveError::MalformedPackerArguments(msg)) if msg.contains("2 entries")
        ));

        let not_split = "eval(function(p,a,c,k,e,d){return p}('0',36,1,'x',0,{}))";
        assert!(matches!(
            ObfuscatedScript::parse(not_split),
            Err(ResolveError::MalformedPackerArguments(_))
        ));
    }

    #[test]
    fn radix_above_62_is_rejected() {
        let mut words = vec![""; 63];
        words[62] = "WORD";
        let call = packed("var a = [ 1 ];", 95, 63, &words.join("|"));
        assert!(matches!(
            ObfuscatedScript::parse(&call),
            Err(ResolveError::MalformedPackerArguments(msg)) if msg.contains("radix 95")
        ));
        assert!(matches!(unpack(&call), Err(ResolveError::MalformedPackerArguments(_))));
    }

    #[test]
    fn dictionary_words_with_dollar_are_literal() {
        let call = packed("0(1)", 36, 2, "$|$1");
        assert_eq!(unpack(&call).unwrap(), "$($1)");
    }

    #[test]
    fn extended_alphabet_token_names() {
        assert_eq!(token_name(0, 36), "0");
        assert_eq!(token_name(35, 36), "z");
        assert_eq!(token_name(36, 36), "10");
        assert_eq!(token_name(35, 62), "z");
        assert_eq!(token_name(36, 62), "A");
        assert_eq!(token_name(61, 62), "Z");
        assert_eq!(token_name(62, 62), "10");
        assert_eq!(token_name(62 * 62 - 1, 62), "ZZ");
    }

    #[test]
    fn decodes_base62_payload() {
        let mut words = vec![""; 64];
        words[36] = "jwplayer";
        words[37] = "setup";
        words[63] = "file";
        let call = packed("A().B({11:\\'x\\'})", 62, 64, &words.join("|"));
        let script = ObfuscatedScript::parse(&call).unwrap();
        assert_eq!(script.alphabet(), Alphabet::Extended);
        assert_eq!(script.decode(), "jwplayer().setup({file:'x'})");
    }

    #[test]
    fn resolves_string_escapes_in_payload() {
        let call = packed(r"0(\'\x68i\')\n", 10, 1, "alert");
        assert_eq!(unpack(&call).unwrap(), "alert('hi')\n");
    }

    #[test]
    fn decoding_is_repeatable() {
        let call = packed("0 1 0", 36, 2, "a|b");
        let script = ObfuscatedScript::parse(&call).unwrap();
        assert_eq!(script.decode(), script.decode());
        assert_eq!(script.decode(), "a b a");
    }
}
