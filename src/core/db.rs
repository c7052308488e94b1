use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};

use crate::config::Config;
use crate::core::errors::ApiError;
use crate::models::{follows, likes, message, session, user};
use crate::{follow, messages, users};

pub async fn connect(config: &Config) -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new(config.database_url.clone());
    opts.sqlx_logging_level(log::LevelFilter::Debug);
    // every pooled connection to `sqlite::memory:` would get its own database
    if config.database_url.contains(":memory:") {
        opts.max_connections(1);
    }

    let db = Database::connect(opts).await?;
    log::info!("connected to {:?} database", db.get_database_backend());
    create_schema(&db).await?;
    Ok(db)
}

/// Create every table that does not exist yet. Parents come before the
/// tables holding foreign keys into them.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, user::Entity).await?;
    create_table(db, message::Entity).await?;
    create_table(db, follows::Entity).await?;
    create_table(db, likes::Entity).await?;
    create_table(db, session::Entity).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

struct DemoUser {
    username: &'static str,
    email: &'static str,
    bio: &'static str,
    messages: &'static [&'static str],
}

const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        username: "test",
        email: "test@warbler.dev",
        bio: "Test user bio",
        messages: &["This is my first warble!"],
    },
    DemoUser {
        username: "alice",
        email: "alice@warbler.dev",
        bio: "Hello, I'm Alice!",
        messages: &[
            "Welcome to my corner! Excited to share thoughts here.",
            "Just finished an amazing project. Feeling productive today!",
        ],
    },
    DemoUser {
        username: "bob",
        email: "bob@warbler.dev",
        bio: "Bob's corner of the internet",
        messages: &["Hey everyone! Just joined, looking forward to connecting with you all."],
    },
];

/// Seed a few demo accounts (password = username) unless they exist.
pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<(), ApiError> {
    let mut seeded = Vec::new();

    for demo in DEMO_USERS {
        if let Some(existing) = users::find_by_username(db, demo.username).await? {
            seeded.push(existing);
            continue;
        }

        let created = users::signup(db, demo.username, demo.email, demo.username, None).await?;
        let created = users::update_profile(
            db,
            created,
            users::ProfileChanges {
                bio: Some(demo.bio.to_string()),
                ..Default::default()
            },
        )
        .await?;

        for text in demo.messages {
            messages::create_message(db, &created, text).await?;
        }
        log::info!("seeded demo user {}", created);
        seeded.push(created);
    }

    // "test" follows "bob"
    if let (Some(test), Some(bob)) = (
        seeded.iter().find(|u| u.username == "test"),
        seeded.iter().find(|u| u.username == "bob"),
    ) {
        follow::follow_user(db, test.id, bob.id).await?;
    }

    Ok(())
}
