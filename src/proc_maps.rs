//! `ImageMapping`: one row of `/proc/<pid>/maps`. Parsing is adapted from
//! the teacher crate's `samply/src/linux/proc_maps.rs`.

/// One row of `/proc/<pid>/maps`. Created on demand, never mutated after
/// creation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ImageMapping {
    pub start: u64,
    pub end: u64,
    pub is_executable: bool,
    pub file_offset: u64,
    pub backing_file: String,
}

impl ImageMapping {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

fn get_until<'a>(p: &mut &'a str, delimiter: char) -> &'a str {
    match p.find(delimiter) {
        Some(index) => {
            let (before, after) = p.split_at(index);
            *p = &after[delimiter.len_utf8()..];
            before
        }
        None => {
            let before = *p;
            *p = "";
            before
        }
    }
}

fn get_char(p: &mut &str) -> Option<char> {
    let ch = p.chars().next()?;
    *p = &p[ch.len_utf8()..];
    Some(ch)
}

fn skip_whitespace(p: &mut &str) {
    while let Some(' ') = p.chars().next() {
        *p = &p[1..];
    }
}

/// Parses the full contents of `/proc/<pid>/maps` into its rows. Each line
/// has fields `hex-start-hex-end perms hex-offset device inode path`.
pub fn parse(maps: &str) -> Vec<ImageMapping> {
    let mut output = Vec::new();
    for mut line in maps.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let start = match u64::from_str_radix(get_until(&mut line, '-'), 16) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let end = match u64::from_str_radix(get_until(&mut line, ' '), 16) {
            Ok(v) => v,
            Err(_) => continue,
        };
        get_char(&mut line); // read
        get_char(&mut line); // write
        let is_executable = get_char(&mut line) == Some('x');
        get_char(&mut line); // shared/private
        get_char(&mut line); // space

        let file_offset = u64::from_str_radix(get_until(&mut line, ' '), 16).unwrap_or(0);
        get_until(&mut line, ' '); // device
        get_until(&mut line, ' '); // inode
        skip_whitespace(&mut line);
        let backing_file = line.to_owned();

        output.push(ImageMapping { start, end, is_executable, file_offset, backing_file });
    }
    output
}

/// Reads and parses `/proc/<pid>/maps` for a live process.
pub fn read_maps(pid: u32) -> std::io::Result<Vec<ImageMapping>> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/maps"))?;
    Ok(parse(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_typical_maps_contents() {
        let maps = "\
00400000-0040c000 r-xp 00000000 08:02 1321238                            /usr/bin/cat
0060d000-0062e000 rw-p 00000000 00:00 0                                  [heap]
7ffff672c000-7ffff69db000 r--s 00001ac2 1f:33 1335289                    /usr/lib/locale/locale-archive
7ffff5600000-7ffff5800000 rw-p 00000000 00:00 0
";
        let rows = parse(maps);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            ImageMapping {
                start: 0x00400000,
                end: 0x0040c000,
                is_executable: true,
                file_offset: 0,
                backing_file: "/usr/bin/cat".to_owned(),
            }
        );
        assert_eq!(rows[1].backing_file, "[heap]");
        assert!(!rows[1].is_executable);
        assert_eq!(rows[2].file_offset, 0x1ac2);
        assert_eq!(rows[3].backing_file, "");
    }

    #[test]
    fn empty_maps_yields_no_rows() {
        assert_eq!(parse(""), vec![]);
    }

    #[test]
    fn contains_checks_half_open_range() {
        let region = ImageMapping {
            start: 0x1000,
            end: 0x2000,
            is_executable: true,
            file_offset: 0,
            backing_file: String::new(),
        };
        assert!(region.contains(0x1000));
        assert!(region.contains(0x1fff));
        assert!(!region.contains(0x2000));
        assert!(!region.contains(0xfff));
    }
}
