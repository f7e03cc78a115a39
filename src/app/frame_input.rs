use std::cmp::min;

/// Single-line editor for a frame number.
///
/// Accepts digits plus one leading minus sign. The text may be empty or
/// otherwise not a number; `value` then reports `None`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrameInput {
    pub text: String,
    pub cursor_col: usize,
}

impl FrameInput {
    pub fn from_value(value: i64) -> Self {
        let text = value.to_string();
        let cursor_col = text.chars().count();
        Self { text, cursor_col }
    }

    pub fn value(&self) -> Option<i64> {
        self.text.trim().parse::<i64>().ok()
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        self.clamp_cursor();
        let accepted = match ch {
            '0'..='9' => true,
            '-' => self.cursor_col == 0 && !self.text.starts_with('-'),
            _ => false,
        };
        if !accepted {
            return false;
        }

        let byte_index = char_to_byte_index(&self.text, self.cursor_col);
        self.text.insert(byte_index, ch);
        self.cursor_col += 1;
        true
    }

    pub fn insert_str(&mut self, text: &str) {
        for ch in text.trim().chars() {
            self.insert_char(ch);
        }
    }

    pub fn backspace(&mut self) {
        self.clamp_cursor();
        if self.cursor_col == 0 {
            return;
        }

        let byte_index = char_to_byte_index(&self.text, self.cursor_col - 1);
        self.text.remove(byte_index);
        self.cursor_col -= 1;
    }

    pub fn delete_forward(&mut self) {
        self.clamp_cursor();
        if self.cursor_col >= self.text.chars().count() {
            return;
        }

        let byte_index = char_to_byte_index(&self.text, self.cursor_col);
        self.text.remove(byte_index);
    }

    pub fn move_left(&mut self) {
        self.clamp_cursor();
        self.cursor_col = self.cursor_col.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.clamp_cursor();
        self.cursor_col = (self.cursor_col + 1).min(self.text.chars().count());
    }

    pub fn move_home(&mut self) {
        self.cursor_col = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_col = self.text.chars().count();
    }

    /// Adds `delta` to the current value; an unparseable field restarts from zero.
    pub fn step(&mut self, delta: i64) {
        let next = self.value().unwrap_or(0).saturating_add(delta);
        *self = Self::from_value(next);
    }

    fn clamp_cursor(&mut self) {
        let len = self.text.chars().count();
        self.cursor_col = min(self.cursor_col, len);
    }
}

fn char_to_byte_index(text: &str, char_index: usize) -> usize {
    if char_index == 0 {
        return 0;
    }
    match text.char_indices().nth(char_index) {
        Some((idx, _)) => idx,
        None => text.len(),
    }
}
