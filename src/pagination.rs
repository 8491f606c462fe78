//! Cursor bookkeeping for the paginated product list.
use crate::error::GridError;
use crate::model::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    First,
    Current,
    Next,
    Prev,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursors {
    current: Option<String>,
    next: Option<String>,
    prev: Option<String>,
}

impl Cursors {
    /// Cursor to request for `direction`, or a validation error when the
    /// store offered no page that way.
    pub fn target(&self, direction: PageDirection) -> Result<Option<String>, GridError> {
        match direction {
            PageDirection::First => Ok(None),
            PageDirection::Current => Ok(self.current.clone()),
            PageDirection::Next => self
                .next
                .clone()
                .map(Some)
                .ok_or_else(|| GridError::validation("No next page")),
            PageDirection::Prev => self
                .prev
                .clone()
                .map(Some)
                .ok_or_else(|| GridError::validation("No previous page")),
        }
    }

    /// Record where a fetch for `requested` landed.
    pub fn advance(&mut self, requested: Option<String>, page: &Page) {
        self.current = requested;
        self.next = page.next_cursor.clone();
        self.prev = page.prev_cursor.clone();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_prev(&self) -> bool {
        self.prev.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_store_cursors() {
        let mut c = Cursors::default();
        assert_eq!(c.target(PageDirection::First).unwrap(), None);
        assert!(c.target(PageDirection::Next).is_err());

        let page = Page {
            next_cursor: Some("n2".into()),
            ..Default::default()
        };
        c.advance(None, &page);
        assert!(c.has_next() && !c.has_prev());
        assert_eq!(c.target(PageDirection::Next).unwrap().as_deref(), Some("n2"));

        let page2 = Page {
            prev_cursor: Some("p1".into()),
            ..Default::default()
        };
        c.advance(Some("n2".into()), &page2);
        assert_eq!(c.target(PageDirection::Current).unwrap().as_deref(), Some("n2"));
        assert_eq!(c.target(PageDirection::Prev).unwrap().as_deref(), Some("p1"));
        assert!(matches!(c.target(PageDirection::Next), Err(GridError::Validation(_))));

        c.reset();
        assert_eq!(c, Cursors::default());
        assert!(c.target(PageDirection::Prev).is_err());
    }
}
