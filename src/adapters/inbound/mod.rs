mod console;

pub use console::{
    parse_color, parse_command, random_color, stdin_lines, Command, CommandError, Console,
    DEFAULT_FONT_SIZE,
};
