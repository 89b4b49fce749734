//! `RegExp` values backed by fancy-regex.
//!
//! JS regex source translates almost directly; the supported flags `i` and
//! `m` become inline flags on the compiled pattern, while `g` only affects
//! the engine-side matching loops (`lastIndex` bookkeeping lives in the
//! property table like any other property).

use crate::heap::{HeapId, HeapRefs};
use crate::object::PropTable;

#[derive(Debug)]
pub(crate) struct JsRegex {
    pub source: Box<str>,
    pub global: bool,
    pub icase: bool,
    pub multiline: bool,
    pub regex: fancy_regex::Regex,
    pub table: PropTable,
}

impl JsRegex {
    /// Compiles a JS pattern with `g`/`i`/`m` flags. Unknown flags and
    /// unsupported syntax report the offending detail.
    pub fn compile(source: &str, flags: &str, table: PropTable) -> Result<Self, String> {
        let mut global = false;
        let mut icase = false;
        let mut multiline = false;
        for flag in flags.chars() {
            match flag {
                'g' => global = true,
                'i' => icase = true,
                'm' => multiline = true,
                other => return Err(format!("Invalid regular expression flag '{other}'")),
            }
        }
        let mut pattern = String::new();
        if icase {
            pattern.push_str("(?i)");
        }
        if multiline {
            pattern.push_str("(?m)");
        }
        pattern.push_str(source);
        let regex = fancy_regex::Regex::new(&pattern).map_err(|e| e.to_string())?;
        Ok(Self { source: source.into(), global, icase, multiline, regex, table })
    }

    pub fn flag_string(&self) -> String {
        let mut s = String::new();
        if self.global {
            s.push('g');
        }
        if self.icase {
            s.push('i');
        }
        if self.multiline {
            s.push('m');
        }
        s
    }
}

impl HeapRefs for JsRegex {
    fn collect_refs(self, out: &mut Vec<HeapId>) {
        self.table.collect_refs(out);
    }
}
