//! File objects returned by `open()`.

use crate::args::Args;
use crate::error::{GuestError, Result};
use crate::value::{GuestObject, Kwargs, Value};
use guestwire_protocol::MethodDescriptor;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::sync::{Mutex, MutexGuard};

const METHODS: &[(&str, &str)] = &[
    ("read", "Read at most size characters, or everything up to EOF if size is negative."),
    ("readline", "Read until newline or EOF."),
    ("readlines", "Return the remaining lines as a list."),
    ("write", "Write a string and return the number of characters written."),
    ("seek", "Move to a new position and return it. whence: 0 start, 1 current, 2 end."),
    ("tell", "Return the current position."),
    ("flush", "Flush write buffers."),
    ("close", "Close the file. Further operations raise ValueError."),
    ("__enter__", ""),
    ("__exit__", ""),
];

/// An open file in the guest filesystem.
///
/// Travels to the host as a stream: the host holds a handle and every
/// `read`/`write` runs here, so the position is shared across calls.
#[derive(Debug)]
pub struct FileObject {
    path: String,
    mode: String,
    readable: bool,
    writable: bool,
    max_read: u64,
    handle: Mutex<Option<BufReader<File>>>,
}

impl FileObject {
    /// Open `path` with a mode string such as `r`, `w`, `a+` or `rb`.
    ///
    /// No single read returns more than `max_read` bytes.
    pub fn open(path: &str, mode: &str, max_read: u64) -> Result<Self> {
        let mut options = OpenOptions::new();
        let plus = mode.contains('+');
        let primary: Vec<char> = mode.chars().filter(|c| "rwax".contains(*c)).collect();
        let invalid = primary.len() != 1
            || mode.chars().any(|c| !"rwaxbt+".contains(c))
            || (mode.contains('b') && mode.contains('t'));
        if invalid {
            return Err(GuestError::value_error(format!("invalid mode: '{mode}'")));
        }

        let (readable, writable) = match primary[0] {
            'r' => {
                options.read(true).write(plus);
                (true, plus)
            }
            'w' => {
                options.write(true).create(true).truncate(true).read(plus);
                (plus, true)
            }
            'a' => {
                options.append(true).create(true).read(plus);
                (plus, true)
            }
            _ => {
                options.write(true).create_new(true).read(plus);
                (plus, true)
            }
        };

        let file = options
            .open(path)
            .map_err(|e| GuestError::os_error(&e, path))?;
        tracing::debug!(path = %path, mode = %mode, "Opened file");

        Ok(Self {
            path: path.to_string(),
            mode: mode.to_string(),
            readable,
            writable,
            max_read,
            handle: Mutex::new(Some(BufReader::new(file))),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<BufReader<File>>> {
        self.handle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn with_open<T>(&self, f: impl FnOnce(&mut BufReader<File>) -> std::io::Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let reader = guard
            .as_mut()
            .ok_or_else(|| GuestError::value_error("I/O operation on closed file."))?;
        f(reader).map_err(|e| GuestError::os_error(&e, &self.path))
    }

    fn require(&self, ok: bool, what: &str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(GuestError::raise_named("UnsupportedOperation", what))
        }
    }

    fn read(&self, size: Option<i64>) -> Result<Value> {
        self.require(self.readable, "not readable")?;
        let max_chars = match size {
            Some(n) if n >= 0 => (n as u64).min(self.max_read),
            _ => u64::MAX,
        };
        let bytes = self.with_open(|reader| read_chars(reader, max_chars, self.max_read))?;
        Ok(Value::Str(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn readline(&self) -> Result<String> {
        self.require(self.readable, "not readable")?;
        let bytes = self.with_open(|reader| {
            let mut buf = Vec::new();
            reader.read_until(b'\n', &mut buf)?;
            Ok(buf)
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn readlines(&self) -> Result<Vec<Value>> {
        let mut lines = Vec::new();
        loop {
            let line = self.readline()?;
            if line.is_empty() {
                return Ok(lines);
            }
            lines.push(Value::Str(line));
        }
    }

    fn write(&self, text: &str) -> Result<Value> {
        self.require(self.writable, "not writable")?;
        self.with_open(|reader| {
            // Seeking discards read-ahead, so the write lands at the
            // logical position.
            reader.seek(SeekFrom::Current(0))?;
            reader.get_mut().write_all(text.as_bytes())
        })?;
        Ok(Value::Int(text.chars().count() as i64))
    }

    fn seek(&self, offset: i64, whence: i64) -> Result<Value> {
        let target = match whence {
            0 if offset < 0 => {
                return Err(GuestError::value_error(format!(
                    "negative seek position {offset}"
                )))
            }
            0 => SeekFrom::Start(offset as u64),
            1 => SeekFrom::Current(offset),
            2 => SeekFrom::End(offset),
            _ => {
                return Err(GuestError::value_error(format!(
                    "invalid whence ({whence}, should be 0, 1 or 2)"
                )))
            }
        };
        let pos = self.with_open(|reader| reader.seek(target))?;
        Ok(Value::Int(pos as i64))
    }

    /// Close the file. It counts as closed even when the final flush fails.
    fn close(&self) -> Result<()> {
        let Some(mut reader) = self.lock().take() else {
            return Ok(());
        };
        tracing::debug!(path = %self.path, "Closed file");
        reader
            .get_mut()
            .flush()
            .map_err(|e| GuestError::os_error(&e, &self.path))
    }
}

/// Read up to `max_chars` whole UTF-8 characters, stopping early once
/// `max_bytes` have been read. Never splits a character.
fn read_chars(reader: &mut impl BufRead, max_chars: u64, max_bytes: u64) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chars = 0u64;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(buf);
        }
        let mut used = 0;
        let mut done = false;
        for &byte in available {
            let starts_char = byte & 0xC0 != 0x80;
            if starts_char {
                if chars == max_chars || (buf.len() + used) as u64 >= max_bytes {
                    done = true;
                    break;
                }
                chars += 1;
            }
            used += 1;
        }
        buf.extend_from_slice(&available[..used]);
        reader.consume(used);
        if done {
            return Ok(buf);
        }
    }
}

impl GuestObject for FileObject {
    fn class_name(&self) -> &str {
        "TextIOWrapper"
    }

    fn module_name(&self) -> &str {
        "io"
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        METHODS
            .iter()
            .map(|(name, doc)| MethodDescriptor::new(*name, (!doc.is_empty()).then_some(*doc)))
            .collect()
    }

    fn attr_names(&self) -> Vec<String> {
        vec!["name".into(), "mode".into(), "closed".into()]
    }

    fn get_attr(&self, name: &str) -> Result<Value> {
        match name {
            "name" => Ok(Value::str(&self.path)),
            "mode" => Ok(Value::str(&self.mode)),
            "closed" => Ok(Value::Bool(self.is_closed())),
            _ => Err(GuestError::attribute_error(self.class_name(), name)),
        }
    }

    fn call_method(&self, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        let a = Args::new(name, &args, &kwargs);
        match name {
            "read" => {
                a.check(1, &["size"])?;
                self.read(a.opt_int(0, "size")?)
            }
            "readline" => {
                a.check(0, &[])?;
                self.readline().map(Value::Str)
            }
            "readlines" => {
                a.check(0, &[])?;
                self.readlines().map(Value::List)
            }
            "write" => {
                a.check(1, &["s"])?;
                self.write(a.str(0, "s")?)
            }
            "seek" => {
                a.check(2, &["offset", "whence"])?;
                let offset = a
                    .opt_int(0, "offset")?
                    .ok_or_else(|| GuestError::type_error("seek() missing required argument: 'offset'"))?;
                self.seek(offset, a.opt_int(1, "whence")?.unwrap_or(0))
            }
            "tell" => {
                let pos = self.with_open(|reader| reader.stream_position())?;
                Ok(Value::Int(pos as i64))
            }
            "flush" => {
                self.with_open(|reader| reader.get_mut().flush())?;
                Ok(Value::None)
            }
            "close" => {
                self.close()?;
                Ok(Value::None)
            }
            "__enter__" => {
                if self.is_closed() {
                    return Err(GuestError::value_error("I/O operation on closed file."));
                }
                Ok(Value::None)
            }
            "__exit__" => {
                self.close()?;
                Ok(Value::Bool(false))
            }
            _ => Err(GuestError::attribute_error(self.class_name(), name)),
        }
    }

    fn iterate(&self) -> Result<Vec<Value>> {
        self.readlines()
    }

    fn is_stream(&self) -> bool {
        true
    }

    fn repr(&self) -> String {
        format!(
            "<io.TextIOWrapper name='{}' mode='{}'>",
            self.path, self.mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_path(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "guestwire-file-{}-{n}-{name}",
            std::process::id()
        ))
    }

    fn call(file: &FileObject, name: &str, args: Vec<Value>) -> Value {
        file.call_method(name, args, vec![]).unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let path = temp_path("rw.txt");
        let path_str = path.to_string_lossy().to_string();

        let file = FileObject::open(&path_str, "w", 1024).unwrap();
        assert_eq!(call(&file, "write", vec![Value::str("one\ntwo\n")]), Value::Int(8));
        call(&file, "close", vec![]);
        assert_eq!(file.get_attr("closed").unwrap(), Value::Bool(true));

        let file = FileObject::open(&path_str, "r", 1024).unwrap();
        assert_eq!(call(&file, "readline", vec![]), Value::str("one\n"));
        assert_eq!(call(&file, "tell", vec![]), Value::Int(4));
        assert_eq!(call(&file, "read", vec![]), Value::str("two\n"));
        assert_eq!(call(&file, "read", vec![]), Value::str(""));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_sized_reads_continue_from_position() {
        let path = temp_path("pos.txt");
        std::fs::write(&path, "abcdef").unwrap();
        let file = FileObject::open(&path.to_string_lossy(), "r", 1024).unwrap();

        assert_eq!(call(&file, "read", vec![Value::Int(2)]), Value::str("ab"));
        assert_eq!(call(&file, "read", vec![Value::Int(2)]), Value::str("cd"));
        call(&file, "seek", vec![Value::Int(0)]);
        assert_eq!(call(&file, "read", vec![Value::Int(3)]), Value::str("abc"));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_max_read_caps_unsized_read() {
        let path = temp_path("cap.txt");
        std::fs::write(&path, "0123456789").unwrap();
        let file = FileObject::open(&path.to_string_lossy(), "r", 4).unwrap();
        assert_eq!(call(&file, "read", vec![]), Value::str("0123"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_write_after_read_lands_at_position() {
        let path = temp_path("update.txt");
        std::fs::write(&path, "abcdef").unwrap();
        let file = FileObject::open(&path.to_string_lossy(), "r+", 1024).unwrap();

        assert_eq!(call(&file, "read", vec![Value::Int(2)]), Value::str("ab"));
        assert_eq!(call(&file, "write", vec![Value::str("X")]), Value::Int(1));
        assert_eq!(call(&file, "tell", vec![]), Value::Int(3));
        assert_eq!(call(&file, "read", vec![]), Value::str("def"));
        call(&file, "close", vec![]);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "abXdef");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_sized_reads_keep_characters_whole() {
        let path = temp_path("utf8.txt");
        std::fs::write(&path, "é!ü€z").unwrap();
        let file = FileObject::open(&path.to_string_lossy(), "r", 1024).unwrap();

        assert_eq!(call(&file, "read", vec![Value::Int(1)]), Value::str("é"));
        assert_eq!(call(&file, "read", vec![Value::Int(1)]), Value::str("!"));
        assert_eq!(call(&file, "read", vec![Value::Int(2)]), Value::str("ü€"));
        assert_eq!(call(&file, "read", vec![]), Value::str("z"));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_max_read_caps_sized_read() {
        let path = temp_path("sized-cap.txt");
        std::fs::write(&path, "0123456789").unwrap();
        let file = FileObject::open(&path.to_string_lossy(), "r", 4).unwrap();
        assert_eq!(call(&file, "read", vec![Value::Int(100)]), Value::str("0123"));
        assert_eq!(call(&file, "read", vec![Value::Int(100)]), Value::str("4567"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_close_flushes_and_is_idempotent() {
        let path = temp_path("close.txt");
        let path_str = path.to_string_lossy().to_string();
        let file = FileObject::open(&path_str, "w", 16).unwrap();
        call(&file, "write", vec![Value::str("kept")]);

        assert_eq!(call(&file, "close", vec![]), Value::None);
        assert_eq!(call(&file, "close", vec![]), Value::None);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_closed_file_raises() {
        let path = temp_path("closed.txt");
        std::fs::write(&path, "x").unwrap();
        let file = FileObject::open(&path.to_string_lossy(), "r", 16).unwrap();
        call(&file, "__exit__", vec![Value::None, Value::None, Value::None]);

        let err = file.call_method("read", vec![], vec![]).unwrap_err();
        assert!(err.to_string().contains("closed file"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_mode_checks() {
        let path = temp_path("modes.txt");
        std::fs::write(&path, "x").unwrap();
        let path_str = path.to_string_lossy().to_string();

        let file = FileObject::open(&path_str, "r", 16).unwrap();
        let err = file.call_method("write", vec![Value::str("y")], vec![]).unwrap_err();
        assert!(err.to_string().starts_with("UnsupportedOperation"));

        assert!(FileObject::open(&path_str, "rw", 16).is_err());
        assert!(FileObject::open(&path_str, "q", 16).is_err());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file() {
        let err = FileObject::open("/nonexistent/guestwire/file", "r", 16).unwrap_err();
        assert_eq!(
            err.kind(),
            Some(guestwire_protocol::ExceptionKind::FileNotFoundError)
        );
    }

    #[test]
    fn test_is_stream_with_methods() {
        let path = temp_path("desc.txt");
        std::fs::write(&path, "").unwrap();
        let file = FileObject::open(&path.to_string_lossy(), "r", 16).unwrap();
        assert!(file.is_stream());
        let names: Vec<String> = file.methods().into_iter().map(|m| m.name).collect();
        assert!(names.contains(&"read".to_string()));
        assert!(names.contains(&"close".to_string()));
        std::fs::remove_file(path).ok();
    }
}
