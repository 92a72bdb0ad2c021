use bytes::Bytes;

/// A decoded command: the command name followed by its arguments, all
/// binary-safe. The RESP/inline parser that produces this — and the
/// socket it reads from — are out of scope; the engine only ever sees
/// this already-tokenized form.
pub type CommandLine = Vec<Bytes>;

pub fn to_command_line(parts: &[&str]) -> CommandLine {
    parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
}
