//! Interactive menu over any `BufRead`/`Write` pair.
//!
//! Errors from the repository are printed and the loop keeps going. End of
//! input behaves like choosing Exit.

use std::io::{self, BufRead, Write};

use domain::{Backend, Book, BookRepository};
use tracing::{error, info};

const BANNER: &str = "======================================================";

const OPTIONS: &str = "\
----------------------------------------------
1. List all books
2. Add a new book
3. Delete a book
4. Exit application
----------------------------------------------";

/// Read one trimmed line; `None` on end of input.
fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, text: &str) -> io::Result<Option<String>> {
    write!(out, "{}", text)?;
    out.flush()?;
    read_line(input)
}

fn optional(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Ask which backend to use until the answer is valid.
///
/// Returns `None` if input ends before a choice is made.
pub fn choose_backend<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> io::Result<Option<Backend>> {
    writeln!(out, "{}", BANNER)?;
    writeln!(out, " Welcome to the Library Manager ")?;
    writeln!(out, "{}", BANNER)?;
    loop {
        writeln!(out, "Please select the database to use:")?;
        writeln!(out, "1. MongoDB")?;
        writeln!(out, "2. MySQL (relational)")?;
        let Some(answer) = prompt(input, out, "Enter your choice [1-2]: ")? else {
            return Ok(None);
        };
        match answer.parse::<u32>() {
            Ok(1) => {
                writeln!(out, "--> MongoDB repository selected.")?;
                return Ok(Some(Backend::Document));
            }
            Ok(2) => {
                writeln!(out, "--> MySQL (relational) repository selected.")?;
                return Ok(Some(Backend::Relational));
            }
            Ok(_) => writeln!(out, "--> Invalid choice. Please try again.")?,
            Err(_) => writeln!(out, "--> Invalid input! Please enter a valid number.")?,
        }
    }
}

/// Run list/add/delete against `repo` until Exit or end of input.
///
/// The repository is closed on the way out either way.
pub fn run<R: BufRead, W: Write>(repo: &dyn BookRepository, input: &mut R, out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", OPTIONS)?;
    loop {
        writeln!(out)?;
        let Some(answer) = prompt(input, out, "Enter your option: ")? else {
            break;
        };
        match answer.parse::<u32>() {
            Ok(1) => list(repo, out)?,
            Ok(2) => {
                if !add(repo, input, out)? {
                    break;
                }
            }
            Ok(3) => {
                if !delete(repo, input, out)? {
                    break;
                }
            }
            Ok(4) => {
                writeln!(out, "--> Exiting application. Goodbye!")?;
                break;
            }
            Ok(_) => writeln!(out, "--> Invalid option. Please enter a number between 1-4.")?,
            Err(_) => writeln!(out, "--> Invalid input! Please enter a valid number.")?,
        }
    }
    if let Err(e) = repo.close() {
        error!(err = %e, "failed to close repository");
    }
    Ok(())
}

fn list<W: Write>(repo: &dyn BookRepository, out: &mut W) -> io::Result<()> {
    match repo.find_all() {
        Ok(books) if books.is_empty() => writeln!(out, "--> No books found in the database."),
        Ok(books) => {
            writeln!(out, "--> Current list of books:")?;
            for b in books {
                writeln!(out, "{}", b)?;
            }
            Ok(())
        }
        Err(e) => report(out, &e),
    }
}

// Returns false when input ran out mid-form.
fn add<R: BufRead, W: Write>(repo: &dyn BookRepository, input: &mut R, out: &mut W) -> io::Result<bool> {
    let Some(raw_id) = prompt(input, out, "Enter book ID: ")? else {
        return Ok(false);
    };
    let Ok(id) = raw_id.parse::<i64>() else {
        writeln!(out, "--> Invalid input! Please enter a valid number.")?;
        return Ok(true);
    };
    let Some(title) = prompt(input, out, "Enter book title: ")? else {
        return Ok(false);
    };
    let Some(author) = prompt(input, out, "Enter book author: ")? else {
        return Ok(false);
    };

    let book = Book {
        id,
        title: optional(title),
        author: optional(author),
    };
    match repo.save(book) {
        Ok(saved) => {
            info!(book_id = saved.id, "book saved from console");
            writeln!(out, "--> Book successfully saved: {}", saved)?;
        }
        Err(e) => report(out, &e)?,
    }
    Ok(true)
}

fn delete<R: BufRead, W: Write>(repo: &dyn BookRepository, input: &mut R, out: &mut W) -> io::Result<bool> {
    let Some(raw_id) = prompt(input, out, "Enter the ID of the book to delete: ")? else {
        return Ok(false);
    };
    let Ok(id) = raw_id.parse::<i64>() else {
        writeln!(out, "--> Invalid input! Please enter a valid number.")?;
        return Ok(true);
    };
    match repo.delete_by_id(id) {
        Ok(true) => writeln!(out, "--> Book with ID {} has been deleted.", id)?,
        Ok(false) => writeln!(out, "--> Book with ID {} not found.", id)?,
        Err(e) => report(out, &e)?,
    }
    Ok(true)
}

fn report<W: Write>(out: &mut W, err: &domain::CoreError) -> io::Result<()> {
    error!(err = %err, "console operation failed");
    writeln!(out, "--> An error occurred during the operation: {}", err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::adapters::memory_repo::InMemoryRepo;
    use std::io::Cursor;

    fn drive(repo: &InMemoryRepo, script: &str) -> String {
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        run(repo, &mut input, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn choose_backend_retries_until_valid() {
        let mut input = Cursor::new(b"abc\n7\n1\n".to_vec());
        let mut out = Vec::new();
        let picked = choose_backend(&mut input, &mut out).unwrap();
        assert_eq!(picked, Some(Backend::Document));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Invalid input!"));
        assert!(text.contains("Invalid choice."));
        assert!(text.contains("MongoDB repository selected."));
    }

    #[test]
    fn choose_backend_relational_and_eof() {
        let mut out = Vec::new();
        let picked = choose_backend(&mut Cursor::new(b"2\n".to_vec()), &mut out).unwrap();
        assert_eq!(picked, Some(Backend::Relational));
        let picked = choose_backend(&mut Cursor::new(Vec::new()), &mut out).unwrap();
        assert_eq!(picked, None);
    }

    #[test]
    fn add_list_delete_exit() {
        let repo = InMemoryRepo::relational();
        let text = drive(&repo, "1\n2\n1\nThe Hobbit\nJ.R.R. Tolkien\n1\n3\n1\n3\n1\n4\n");
        assert!(text.contains("No books found in the database."));
        assert!(text.contains("Book successfully saved: Book #1: 'The Hobbit' by 'J.R.R. Tolkien'"));
        assert!(text.contains("Current list of books:"));
        assert!(text.contains("Book with ID 1 has been deleted."));
        assert!(text.contains("Book with ID 1 not found."));
        assert!(text.contains("Goodbye!"));
        assert!(repo.find_all().is_err(), "exit closes the repository");
    }

    #[test]
    fn errors_are_reported_and_loop_continues() {
        let repo = InMemoryRepo::relational();
        let text = drive(&repo, "2\n9\n\nanon\n9\nx\n4\n");
        assert!(text.contains("An error occurred during the operation"));
        assert!(text.contains("Invalid option."));
        assert!(text.contains("Invalid input!"));
        assert!(text.contains("Goodbye!"));
    }

    #[test]
    fn eof_exits_cleanly() {
        let repo = InMemoryRepo::document();
        let text = drive(&repo, "2\n5\n");
        assert!(!text.contains("Goodbye!"));
        assert!(repo.find_all().is_err());
    }
}
