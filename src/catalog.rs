use serde::{Deserialize, Serialize};
use std::{collections::HashMap, hash::Hash, path::Path, time::Instant};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Book {
    pub book_id: u64,

    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    /// Free-form genre string, e.g. "Fantasy" or "Science Fiction Horror"
    #[serde(default)]
    pub genres: String,
    #[serde(default)]
    pub avg_rating: f32,
    #[serde(default)]
    pub num_ratings: u64,
    #[serde(default)]
    pub tags: String,
}

impl Hash for Book {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.book_id.hash(state)
    }
}

impl PartialEq for Book {
    fn eq(&self, other: &Self) -> bool {
        self.book_id == other.book_id
    }
}

impl Eq for Book {}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("book {0} appears more than once in the catalog")]
    DuplicateId(u64),
}

/// Immutable book metadata keyed by book id.
///
/// Iteration follows the order books were loaded in.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    books: HashMap<u64, Book>,
    order: Vec<u64>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut books = vec![];
        for record in csv_reader.deserialize::<Book>() {
            books.push(record?);
        }

        let catalog = Self::from_books(books)?;

        log::debug!(
            "took {}ms to read catalog of {} books",
            now.elapsed().as_micros() as f64 / 1000.0,
            catalog.len()
        );

        Ok(catalog)
    }

    pub fn from_books(books: Vec<Book>) -> Result<Self, CatalogError> {
        let mut map = HashMap::with_capacity(books.len());
        let mut order = Vec::with_capacity(books.len());

        for book in books {
            let id = book.book_id;
            if map.insert(id, book).is_some() {
                return Err(CatalogError::DuplicateId(id));
            }
            order.push(id);
        }

        Ok(Catalog { books: map, order })
    }

    pub fn get(&self, id: u64) -> Option<&Book> {
        self.books.get(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Book ids in load order.
    pub fn ids(&self) -> &[u64] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Book> {
        self.order.iter().filter_map(|id| self.books.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reads_all_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("books.csv");
        std::fs::write(
            &path,
            "book_id,title,author,description,genres,avg_rating,num_ratings,tags\n\
             3,The Hobbit,J.R.R. Tolkien,There and back again,Fantasy,4.25,2530894,fantasy classics\n\
             1,Dune,Frank Herbert,Spice,Science Fiction,4.2,1000,\n",
        )
        .unwrap();

        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.ids(), &[3, 1]);

        let hobbit = catalog.get(3).unwrap();
        assert_eq!(hobbit.title, "The Hobbit");
        assert_eq!(hobbit.author, "J.R.R. Tolkien");
        assert_eq!(hobbit.genres, "Fantasy");
        assert!((hobbit.avg_rating - 4.25).abs() < 1e-6);
        assert_eq!(hobbit.num_ratings, 2530894);
        assert_eq!(hobbit.tags, "fantasy classics");

        assert_eq!(catalog.get(1).unwrap().tags, "");
        assert!(catalog.get(2).is_none());
    }

    #[test]
    fn load_tolerates_missing_optional_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("books.csv");
        std::fs::write(&path, "book_id,title,genres\n7,Emma,Romance\n").unwrap();

        let catalog = Catalog::load(&path).unwrap();
        let emma = catalog.get(7).unwrap();
        assert_eq!(emma.title, "Emma");
        assert_eq!(emma.author, "");
        assert_eq!(emma.avg_rating, 0.0);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let books = vec![
            Book {
                book_id: 1,
                ..Default::default()
            },
            Book {
                book_id: 1,
                ..Default::default()
            },
        ];

        let result = Catalog::from_books(books);
        assert!(matches!(result, Err(CatalogError::DuplicateId(1))));
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Catalog::load(&tmp.path().join("nope.csv")).is_err());
    }
}
