// ABOUTME: SQL statement splitter for multi-statement migration files
// ABOUTME: Breaks text on semicolons while respecting quotes and comments

/// Scanner state. Exactly one mode is active at any point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Split SQL text into individually executable statements
///
/// A `;` ends a statement only when it appears outside of quoted strings and
/// comments. Each statement is trimmed and empty statements are dropped.
/// Comment text is kept verbatim inside the surrounding statement.
///
/// A quote preceded by a single backslash does not toggle the quote state
/// (`\'` stays inside the literal) while a doubled backslash does (`\\'`
/// closes it).
///
/// # Examples
///
/// ```
/// # use clickhouse_migrator::migration::split_statements;
/// let statements = split_statements("SELECT 'a;b'; SELECT \"c;d\";");
/// assert_eq!(statements, vec!["SELECT 'a;b'", "SELECT \"c;d\""]);
/// ```
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut mode = Mode::Code;
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        let next = chars.get(index + 1).copied();

        match mode {
            Mode::LineComment => {
                current.push(ch);
                if ch == '\n' {
                    mode = Mode::Code;
                }
            }
            Mode::BlockComment => {
                current.push(ch);
                if ch == '*' && next == Some('/') {
                    current.push('/');
                    index += 1;
                    mode = Mode::Code;
                }
            }
            Mode::Code if ch == '-' && next == Some('-') => {
                current.push_str("--");
                index += 1;
                mode = Mode::LineComment;
            }
            Mode::Code if ch == '/' && next == Some('*') => {
                current.push_str("/*");
                index += 1;
                mode = Mode::BlockComment;
            }
            Mode::Code if ch == ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            Mode::Code | Mode::SingleQuoted | Mode::DoubleQuoted => {
                if !is_escaped(&chars, index) {
                    mode = match (mode, ch) {
                        (Mode::Code, '\'') => Mode::SingleQuoted,
                        (Mode::Code, '"') => Mode::DoubleQuoted,
                        (Mode::SingleQuoted, '\'') | (Mode::DoubleQuoted, '"') => Mode::Code,
                        (mode, _) => mode,
                    };
                }
                current.push(ch);
            }
        }

        index += 1;
    }

    push_statement(&mut statements, &current);
    statements
}

/// True when the character at `index` follows a lone backslash
fn is_escaped(chars: &[char], index: usize) -> bool {
    let prev = index.checked_sub(1).map(|i| chars[i]);
    let before_prev = index.checked_sub(2).map(|i| chars[i]);
    prev == Some('\\') && before_prev != Some('\\')
}

fn push_statement(statements: &mut Vec<String>, buffer: &str) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}
