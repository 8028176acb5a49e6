//! Small value types shared across the crate

use std::fmt;

/// Top-left corner of a monitor in the virtual screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

impl Position {
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Pixel size of a monitor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

impl Resolution {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u32 {
        self.width as u32 * self.height as u32
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_area_and_zero() {
        assert_eq!(Resolution::new(1920, 1080).area(), 2_073_600);
        assert!(Resolution::new(0, 1080).is_zero());
        assert!(!Resolution::new(800, 600).is_zero());
    }

    #[test]
    fn test_resolution_display() {
        assert_eq!(Resolution::new(2560, 1440).to_string(), "2560x1440");
    }
}
