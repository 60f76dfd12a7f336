//! Terminal output for command results
//!
//! Every command either prints a short human-readable rendering or, with
//! `--json`, the value itself.

use anyhow::Result;
use serde::Serialize;

use crate::models::{
    Book, FavoriteBook, Page, RecommendationSet, Review, ReviewStats, User, UserProfile, UserStats,
};
use crate::models::review::{MAX_RATING, MIN_RATING};

/// Print `value` as JSON, or the text produced by `render`
pub fn emit<T: Serialize>(json: bool, value: &T, render: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        let text = render(value);
        if !text.is_empty() {
            println!("{}", text);
        }
    }
    Ok(())
}

pub fn stars(rating: u8) -> String {
    let filled = rating.clamp(MIN_RATING, MAX_RATING) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(MAX_RATING as usize - filled))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

fn page_footer<T>(page: &Page<T>) -> String {
    if page.total_pages <= 1 {
        return format!("{} result(s)", page.total_elements);
    }
    let mut footer = format!(
        "Page {} of {} ({} results)",
        page.number + 1,
        page.total_pages,
        page.total_elements
    );
    if page.has_previous() {
        footer.push_str(&format!(", previous: --page {}", page.number - 1));
    }
    if page.has_next() {
        footer.push_str(&format!(", next: --page {}", page.number + 1));
    }
    footer
}

fn list<T>(page: &Page<T>, line: impl Fn(&T) -> String, empty: &str) -> String {
    if page.content.is_empty() {
        return empty.to_string();
    }
    let mut lines: Vec<String> = page.content.iter().map(line).collect();
    lines.push(page_footer(page));
    lines.join("\n")
}

pub fn book_line(book: &Book) -> String {
    let year = book
        .published_year
        .map(|y| format!(" ({})", y))
        .unwrap_or_default();
    format!(
        "#{:<5} {} by {}{}  {:.1}★ [{} reviews]",
        book.id, book.title, book.author, year, book.average_rating, book.total_reviews
    )
}

pub fn books(page: &Page<Book>) -> String {
    list(page, book_line, "No books found")
}

pub fn book_details(book: &Book) -> String {
    let mut lines = vec![book_line(book)];
    if !book.genres.is_empty() {
        lines.push(format!("Genres: {}", book.genres.join(", ")));
    }
    if !book.description.is_empty() {
        lines.push(String::new());
        lines.push(book.description.clone());
    }
    lines.join("\n")
}

pub fn review_line(review: &Review) -> String {
    let author = format!("{} {}", review.user_first_name, review.user_last_name);
    let about = if review.book_title.is_empty() {
        format!("book #{}", review.book_id)
    } else {
        review.book_title.clone()
    };
    format!(
        "#{:<5} {} {} on {}: {}",
        review.id,
        stars(review.rating),
        author.trim(),
        about,
        truncate(&review.text, 60)
    )
}

pub fn reviews(page: &Page<Review>) -> String {
    list(page, review_line, "No reviews yet")
}

pub fn review_details(review: &Review) -> String {
    let mut lines = vec![review_line(review)];
    if let Some(created) = &review.created_at {
        lines.push(format!("Written {}", created));
    }
    lines.push(String::new());
    lines.push(review.text.clone());
    lines.join("\n")
}

pub fn review_stats(stats: &ReviewStats) -> String {
    let mut lines = vec![format!(
        "{} review(s), average {:.1}",
        stats.total_reviews, stats.average_rating
    )];
    for rating in (MIN_RATING..=MAX_RATING).rev() {
        let count = stats.rating_distribution.get(&rating).copied().unwrap_or(0);
        lines.push(format!("{} {}", stars(rating), count));
    }
    lines.join("\n")
}

pub fn user(user: &User) -> String {
    let role = if user.is_admin() { " [admin]" } else { "" };
    format!("{} <{}> (#{}){}", user.full_name(), user.email, user.id, role)
}

pub fn profile(profile: &UserProfile) -> String {
    let mut lines = vec![format!(
        "{} {} <{}>",
        profile.first_name, profile.last_name, profile.email
    )];
    if let Some(bio) = profile.bio.as_deref().filter(|b| !b.is_empty()) {
        lines.push(bio.to_string());
    }
    if !profile.preferred_genres.is_empty() {
        lines.push(format!("Preferred genres: {}", profile.preferred_genres.join(", ")));
    }
    lines.push(format!(
        "{} review(s), {} favorite(s), average rating {:.1}",
        profile.total_reviews, profile.total_favorite_books, profile.average_rating
    ));
    lines.join("\n")
}

pub fn user_stats(stats: &UserStats) -> String {
    format!(
        "Reviews: {}\nFavorites: {}\nAverage rating: {:.1}",
        stats.total_reviews, stats.total_favorite_books, stats.average_rating
    )
}

pub fn favorites(page: &Page<FavoriteBook>) -> String {
    list(
        page,
        |book| {
            let reviewed = if book.has_user_reviewed { "  (reviewed)" } else { "" };
            format!("#{:<5} {} by {}{}", book.id, book.title, book.author, reviewed)
        },
        "No favorites yet",
    )
}

pub fn recommendations(set: &RecommendationSet) -> String {
    if set.recommendations.is_empty() {
        return format!("No {} recommendations right now", set.strategy);
    }
    let mut lines = vec![format!("{} ({})", set.strategy, set.total_count)];
    for rec in &set.recommendations {
        lines.push(book_line(&rec.book));
        if !rec.reason.is_empty() {
            lines.push(format!("       {}", rec.reason));
        }
    }
    lines.join("\n")
}
