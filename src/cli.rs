//! Minimal CLI parsing for the demo binary.

use std::env;

#[derive(Debug, Default)]
pub struct CliOptions {
    /// Print each rendered statement before its rows
    pub show_sql: bool,
    pub help: bool,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    fn parse<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut options = CliOptions::default();
        for arg in args {
            match arg.as_str() {
                "--show-sql" => options.show_sql = true,
                "-h" | "--help" => options.help = true,
                _ => {}
            }
        }
        options
    }

    pub fn usage() -> &'static str {
        "Usage: querykit-demo [--show-sql]\n\n\
         Seeds the sample team/member schema and prints the showcase queries as JSON.\n\n\
         Options:\n  \
           --show-sql   print each rendered SQL statement\n  \
           -h, --help   show this message"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliOptions {
        CliOptions::parse(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_show_sql_flag() {
        assert!(parse(&["--show-sql"]).show_sql);
        assert!(!parse(&[]).show_sql);
    }

    #[test]
    fn test_unknown_flags_ignored() {
        let options = parse(&["--verbose", "--help"]);
        assert!(options.help);
        assert!(!options.show_sql);
    }
}
