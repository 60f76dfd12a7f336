mod api;
mod app;
mod cache;
mod config;
mod models;
mod session;
mod ui;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::ClientError;
use app::App;
use config::AppConfig;
use models::{
    BookSearchParams, NewReview, PageParams, ProfileUpdate, RecommendationParams, RegisterRequest,
    ReviewFilters, ReviewUpdate, Strategy,
};

#[derive(Parser, Debug)]
#[command(name = "bookshelf")]
#[command(version = "0.1.0")]
#[command(about = "Command-line client for the book review service")]
struct Args {
    /// Backend base URL (overrides config and BOOKSHELF_API_BASE_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log requests and auth state changes to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Pagination flags shared by list commands
#[derive(clap::Args, Debug, Clone)]
struct PageArgs {
    /// Zero-based page number
    #[arg(long, default_value_t = 0)]
    page: u32,

    #[arg(long, default_value_t = 20)]
    size: u32,

    /// Field to sort by, e.g. title or averageRating
    #[arg(long)]
    sort_by: Option<String>,

    /// asc or desc
    #[arg(long)]
    sort_order: Option<String>,
}

impl PageArgs {
    fn params(&self) -> PageParams {
        PageParams {
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order.clone(),
            ..PageParams::new(self.page, self.size)
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
        /// Accept the terms of service
        #[arg(long)]
        agree_to_terms: bool,
    },
    /// Log out and forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Request a password reset email
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Set a new password using the token from the reset email
    ResetPassword {
        #[arg(long)]
        token: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    #[command(subcommand)]
    Books(BooksCommand),
    #[command(subcommand)]
    Reviews(ReviewsCommand),
    #[command(subcommand)]
    Favorites(FavoritesCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Book recommendations
    Recommend {
        /// top-rated, genre-based, similar-users, trending, personalized or ai-powered
        #[arg(long, default_value = "personalized")]
        strategy: Strategy,
        #[arg(long)]
        limit: Option<u32>,
        /// Skip books already reviewed
        #[arg(long)]
        exclude_reviewed: bool,
        /// Ignore cached results
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Subcommand, Debug)]
enum BooksCommand {
    /// Browse the catalog
    List {
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        genre: Vec<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        min_rating: Option<f64>,
    },
    /// Show one book with your review and favorite status
    Show { id: i64 },
    /// Search titles and authors
    Search {
        query: String,
        #[command(flatten)]
        page: PageArgs,
    },
    Genre {
        genre: String,
        #[command(flatten)]
        page: PageArgs,
    },
    TopRated {
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ReviewsCommand {
    /// Filter reviews across the catalog
    List {
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        book: Option<i64>,
        #[arg(long)]
        user: Option<i64>,
        #[arg(long)]
        rating: Option<u8>,
        #[arg(long)]
        min_rating: Option<u8>,
    },
    /// Reviews of a book
    Book {
        book_id: i64,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Reviews written by a user
    User {
        user_id: i64,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Your reviews, or your review of one book with --book
    Mine {
        #[arg(long)]
        book: Option<i64>,
        #[command(flatten)]
        page: PageArgs,
    },
    Show { id: i64 },
    Add {
        book_id: i64,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        text: String,
    },
    Edit {
        id: i64,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        text: String,
    },
    Delete { id: i64 },
    /// Rating summary for a book
    Stats { book_id: i64 },
}

#[derive(Subcommand, Debug)]
enum FavoritesCommand {
    List {
        #[command(flatten)]
        page: PageArgs,
    },
    Add { book_id: i64 },
    Remove { book_id: i64 },
    Toggle { book_id: i64 },
    Check { book_id: i64 },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Show,
    /// Change only the fields given
    Update {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        /// Comma-separated genre list
        #[arg(long, value_delimiter = ',')]
        genres: Option<Vec<String>>,
    },
    /// Reading statistics
    Stats,
}

impl Command {
    /// Commands that start a session, where a 401 means bad credentials
    fn is_auth(&self) -> bool {
        matches!(
            self,
            Command::Login { .. }
                | Command::Register { .. }
                | Command::ForgotPassword { .. }
                | Command::ResetPassword { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = AppConfig::load()?;
    if let Some(url) = &args.api_url {
        config.apply_base_url_override(url);
    }

    let mut app = App::new(config)?;
    tracing::debug!("Using API at {}", app.config.api_base_url);
    let is_auth = args.command.is_auth();
    let had_session = app.has_session();

    if let Err(e) = run(&mut app, args.command, args.json).await {
        let client_error = e.downcast_ref::<ClientError>();
        let login_hint = client_error
            .filter(|_| !is_auth)
            .and_then(|err| app::login_required(&app, err, had_session));
        if let Some(hint) = login_hint {
            eprintln!("{}", hint);
        } else {
            eprintln!("Error: {:#}", e);
            if let Some(ClientError::Http { field_errors, .. }) = client_error {
                for (field, message) in field_errors {
                    eprintln!("  {}: {}", field, message);
                }
            }
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Prompt on stderr and read one line from stdin
fn read_secret(prompt: &str, given: Option<String>) -> Result<String> {
    if let Some(value) = given {
        return Ok(value);
    }
    eprint!("{}: ", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line.is_empty() {
        bail!("{} is required", prompt);
    }
    Ok(line)
}

fn book_search(page: &PageArgs) -> BookSearchParams {
    BookSearchParams {
        page: page.params(),
        ..Default::default()
    }
}

async fn run(app: &mut App, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = read_secret("Password", password)?;
            let user = app.login(&email, &password).await?;
            ui::emit(json, &user, |u| format!("Logged in as {}", ui::user(u)))?;
        }
        Command::Register {
            email,
            first_name,
            last_name,
            password,
            agree_to_terms,
        } => {
            let password = read_secret("Password", password)?;
            let form = RegisterRequest {
                email,
                confirm_password: password.clone(),
                password,
                first_name,
                last_name,
                agree_to_terms,
            };
            let user = app.register(&form).await?;
            ui::emit(json, &user, |u| format!("Welcome, {}", ui::user(u)))?;
        }
        Command::Logout => {
            app.logout().await?;
            if !json {
                println!("Logged out");
            }
        }
        Command::Whoami => match app.current_user()? {
            Some(user) => ui::emit(json, &user, ui::user)?,
            None => bail!("Not logged in"),
        },
        Command::ForgotPassword { email } => {
            app.forgot_password(&email).await?;
            println!("If {} has an account, a reset link is on its way", email);
        }
        Command::ResetPassword { token, password } => {
            let password = read_secret("New password", password)?;
            app.reset_password(&token, &password).await?;
            println!("Password updated, you can log in now");
        }
        Command::Books(command) => run_books(app, command, json).await?,
        Command::Reviews(command) => run_reviews(app, command, json).await?,
        Command::Favorites(command) => run_favorites(app, command, json).await?,
        Command::Profile(command) => run_profile(app, command, json).await?,
        Command::Recommend {
            strategy,
            limit,
            exclude_reviewed,
            refresh,
        } => {
            let params = RecommendationParams {
                limit,
                exclude_already_reviewed: exclude_reviewed.then_some(true),
                ..Default::default()
            };
            let set = app.recommendations(strategy, &params, refresh).await?;
            ui::emit(json, &set, ui::recommendations)?;
        }
    }
    Ok(())
}

async fn run_books(app: &mut App, command: BooksCommand, json: bool) -> Result<()> {
    match command {
        BooksCommand::List {
            page,
            author,
            genre,
            year,
            min_rating,
        } => {
            let params = BookSearchParams {
                author,
                genres: genre.iter().map(|g| g.to_uppercase()).collect(),
                published_year: year,
                min_rating,
                ..book_search(&page)
            };
            let books = app.books(&params).await?;
            ui::emit(json, &books, ui::books)?;
        }
        BooksCommand::Show { id } => {
            let book = app.book(id).await?;
            if app.current_user()?.is_none() {
                return ui::emit(json, &book, ui::book_details);
            }

            let favorite = app.is_favorite(id).await?;
            let reviewed = app.has_reviewed(id).await?;
            let value = serde_json::json!({
                "book": book,
                "isFavorite": favorite,
                "hasReviewed": reviewed,
            });
            ui::emit(json, &value, |_| {
                let mut text = ui::book_details(&book);
                if favorite {
                    text.push_str("\n\n♥ In your favorites");
                }
                if reviewed {
                    text.push_str("\n✎ You reviewed this book");
                }
                text
            })?;
        }
        BooksCommand::Search { query, page } => {
            let books = app.search_books(&query, &book_search(&page)).await?;
            ui::emit(json, &books, ui::books)?;
        }
        BooksCommand::Genre { genre, page } => {
            let books = app.books_by_genre(&genre, &book_search(&page)).await?;
            ui::emit(json, &books, ui::books)?;
        }
        BooksCommand::TopRated { page } => {
            let books = app.top_rated_books(&book_search(&page)).await?;
            ui::emit(json, &books, ui::books)?;
        }
    }
    Ok(())
}

async fn run_reviews(app: &mut App, command: ReviewsCommand, json: bool) -> Result<()> {
    match command {
        ReviewsCommand::List {
            page,
            book,
            user,
            rating,
            min_rating,
        } => {
            let filters = ReviewFilters {
                page: page.params(),
                book_id: book,
                user_id: user,
                rating,
                min_rating,
            };
            let reviews = app.reviews(&filters).await?;
            ui::emit(json, &reviews, ui::reviews)?;
        }
        ReviewsCommand::Book { book_id, page } => {
            let reviews = app.book_reviews(book_id, &page.params()).await?;
            ui::emit(json, &reviews, ui::reviews)?;
        }
        ReviewsCommand::User { user_id, page } => {
            let reviews = app.user_reviews(user_id, &page.params()).await?;
            ui::emit(json, &reviews, ui::reviews)?;
        }
        ReviewsCommand::Mine {
            book: Some(book_id),
            ..
        } => {
            let review = app.my_review_for_book(book_id).await?;
            ui::emit(json, &review, |review| match review {
                Some(review) => ui::review_details(review),
                None => format!("You haven't reviewed book #{}", book_id),
            })?;
        }
        ReviewsCommand::Mine { book: None, page } => {
            let reviews = app.my_reviews(&page.params()).await?;
            ui::emit(json, &reviews, ui::reviews)?;
        }
        ReviewsCommand::Show { id } => {
            let review = app.review(id).await?;
            ui::emit(json, &review, ui::review_details)?;
        }
        ReviewsCommand::Add {
            book_id,
            rating,
            text,
        } => {
            let review = app
                .create_review(&NewReview {
                    book_id,
                    rating,
                    text,
                })
                .await?;
            ui::emit(json, &review, |r| format!("Review #{} posted", r.id))?;
        }
        ReviewsCommand::Edit { id, rating, text } => {
            let review = app.update_review(id, &ReviewUpdate { rating, text }).await?;
            ui::emit(json, &review, |r| format!("Review #{} updated", r.id))?;
        }
        ReviewsCommand::Delete { id } => {
            app.delete_review(id).await?;
            if !json {
                println!("Review #{} deleted", id);
            }
        }
        ReviewsCommand::Stats { book_id } => {
            let stats = app.review_stats(book_id).await?;
            ui::emit(json, &stats, ui::review_stats)?;
        }
    }
    Ok(())
}

async fn run_favorites(app: &mut App, command: FavoritesCommand, json: bool) -> Result<()> {
    let toggle = match command {
        FavoritesCommand::List { page } => {
            let favorites = app.favorites(&page.params()).await?;
            return ui::emit(json, &favorites, ui::favorites);
        }
        FavoritesCommand::Check { book_id } => {
            let favorite = app.is_favorite(book_id).await?;
            return ui::emit(json, &favorite, |f| (if *f { "Yes" } else { "No" }).to_string());
        }
        FavoritesCommand::Add { book_id } => app.add_favorite(book_id).await?,
        FavoritesCommand::Remove { book_id } => app.remove_favorite(book_id).await?,
        FavoritesCommand::Toggle { book_id } => app.toggle_favorite(book_id).await?,
    };
    ui::emit(json, &toggle, |t| t.message.clone())
}

async fn run_profile(app: &mut App, command: ProfileCommand, json: bool) -> Result<()> {
    match command {
        ProfileCommand::Show => {
            let profile = app.profile().await?;
            ui::emit(json, &profile, ui::profile)?;
        }
        ProfileCommand::Update {
            first_name,
            last_name,
            bio,
            genres,
        } => {
            let update = ProfileUpdate {
                first_name,
                last_name,
                bio,
                preferred_genres: genres
                    .map(|genres| genres.iter().map(|g| g.trim().to_uppercase()).collect()),
            };
            let profile = app.update_profile(&update).await?;
            ui::emit(json, &profile, ui::profile)?;
        }
        ProfileCommand::Stats => {
            let stats = app.stats().await?;
            ui::emit(json, &stats, ui::user_stats)?;
        }
    }
    Ok(())
}
