/// Character display boundary and the page cycling consumer
///
/// The display hardware protocol is not handled here; a `LineDisplay`
/// receives whole lines already fitted to its width.
use log::info;

use crate::error::DisplayError;

pub mod multiplexer;

pub use multiplexer::DisplayMultiplexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayLine {
    First,
    Second,
}

impl DisplayLine {
    pub fn index(self) -> usize {
        match self {
            DisplayLine::First => 0,
            DisplayLine::Second => 1,
        }
    }
}

pub trait LineDisplay: Send {
    /// Number of character columns.
    fn width(&self) -> usize;

    fn write_line(&mut self, text: &str, line: DisplayLine) -> Result<(), DisplayError>;

    fn release(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

impl<T: LineDisplay + ?Sized> LineDisplay for Box<T> {
    fn width(&self) -> usize {
        (**self).width()
    }

    fn write_line(&mut self, text: &str, line: DisplayLine) -> Result<(), DisplayError> {
        (**self).write_line(text, line)
    }

    fn release(&mut self) -> Result<(), DisplayError> {
        (**self).release()
    }
}

/// Truncate or right-pad `text` to exactly `width` characters.
pub fn fit_to_width(text: &str, width: usize) -> String {
    let mut fitted: String = text.chars().take(width).collect();
    let len = fitted.chars().count();
    fitted.extend(std::iter::repeat(' ').take(width - len));
    fitted
}

/// Write two lines, fitted to the display width.
pub fn show<D: LineDisplay + ?Sized>(display: &mut D, first: &str, second: &str) -> Result<(), DisplayError> {
    let width = display.width();
    display.write_line(&fit_to_width(first, width), DisplayLine::First)?;
    display.write_line(&fit_to_width(second, width), DisplayLine::Second)
}

/// Display that logs each line it is sent, for stations without an LCD.
///
/// Like a real character LCD it only accepts lines of exactly its width.
pub struct ConsoleDisplay {
    width: usize,
}

impl ConsoleDisplay {
    pub fn new(width: usize) -> Self {
        ConsoleDisplay { width }
    }
}

impl LineDisplay for ConsoleDisplay {
    fn width(&self) -> usize {
        self.width
    }

    fn write_line(&mut self, text: &str, line: DisplayLine) -> Result<(), DisplayError> {
        let columns = text.chars().count();
        if columns != self.width {
            return Err(DisplayError::Write(format!(
                "line {} has {} columns, display has {}",
                line.index() + 1,
                columns,
                self.width
            )));
        }
        info!("Display {} |{}|", line.index() + 1, text);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingDisplay;
    use super::*;

    #[test]
    fn fits_text_to_width() {
        assert_eq!(fit_to_width("Hum: 40%", 16), "Hum: 40%        ");
        assert_eq!(fit_to_width("Afternoon very bright", 16), "Afternoon very b");
        assert_eq!(fit_to_width("", 4), "    ");
        assert_eq!(fit_to_width("Temp: 21°C", 16).chars().count(), 16);
    }

    #[test]
    fn console_rejects_unfitted_lines() {
        let mut console = ConsoleDisplay::new(16);
        assert!(matches!(
            console.write_line("Temp: 21.0C", DisplayLine::First),
            Err(DisplayError::Write(_))
        ));
        assert!(console
            .write_line(&fit_to_width("Temp: 21.0C", 16), DisplayLine::First)
            .is_ok());
        assert!(show(&mut console, "Weather station", "Starting...").is_ok());
    }

    #[test]
    fn show_writes_both_lines() {
        let mut display = RecordingDisplay::default();
        show(&mut display, "Weather station", "Starting...").unwrap();
        assert_eq!(
            display.lines,
            vec![
                (DisplayLine::First, "Weather station ".to_string()),
                (DisplayLine::Second, "Starting...     ".to_string()),
            ]
        );
    }
}
