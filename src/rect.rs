use serde::Serialize;

/// Axis-aligned rectangle in pixel coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect<T> {
    left: T,
    top: T,
    width: T,
    height: T,
}

impl<T: Copy> Rect<T> {
    pub fn with_size(left: T, top: T, width: T, height: T) -> Self {
        Self { left, top, width, height }
    }

    pub fn left(&self) -> T {
        self.left
    }

    pub fn top(&self) -> T {
        self.top
    }

    pub fn width(&self) -> T {
        self.width
    }

    pub fn height(&self) -> T {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let r = Rect::with_size(3, 4, 10, 20);
        assert_eq!((r.left(), r.top(), r.width(), r.height()), (3, 4, 10, 20));
    }

    #[test]
    fn serializes_fields() {
        let json = serde_json::to_string(&Rect::with_size(1, 2, 3, 4)).unwrap();
        assert_eq!(json, r#"{"left":1,"top":2,"width":3,"height":4}"#);
    }
}
