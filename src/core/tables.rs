//! 社交平台各逻辑表的注册信息。
//!
//! 字段名必须与 `migrations/*.sql` 中的列保持一致。

use crate::core::registry::{
    Column, EnumRule, Fill, MediaAlias, MembershipHook, Relation, SchemaGroup, SenderGuard,
    TableEntry,
};

const ID: Column = Column::server("id", Fill::Uuid);
const CREATED_AT: Column = Column::server("createdAt", Fill::Now);

const PROFILE_CARD: &[&str] = &["id", "username", "displayName", "avatarUrl"];
const PROFILE_BRIEF: &[&str] = &["id", "username", "avatarUrl"];

// 外部 "declined" 存为 REJECTED，而不是 DECLINED
const REQUEST_STATUS: EnumRule = EnumRule {
    field: "status",
    on_write: &[("declined", "REJECTED")],
    on_read: &[("REJECTED", "declined")],
};

pub static TABLES: &[TableEntry] = &[
    // ---- social ----
    TableEntry {
        name: "profiles",
        accessor: "Profile",
        group: SchemaGroup::Social,
        columns: &[
            ID,
            Column::new("username"),
            Column::new("displayName").sparse(),
            Column::new("avatarUrl").sparse(),
            Column::new("bio").sparse(),
            CREATED_AT,
        ],
        renames: &[],
        enums: &[],
        relations: &[],
        unique: &[&["username"]],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: Some("Username is already taken"),
    },
    TableEntry {
        name: "friend_requests",
        accessor: "FriendRequest",
        group: SchemaGroup::Social,
        columns: &[
            ID,
            Column::new("senderId"),
            Column::new("recipientId"),
            Column::new("status").default_to(Fill::Text("PENDING")),
            CREATED_AT,
        ],
        renames: &[("from_user_id", "senderId"), ("to_user_id", "recipientId")],
        enums: &[REQUEST_STATUS],
        relations: &[
            Relation {
                name: "sender",
                key: "from_user",
                target: "profiles",
                foreign_key: "senderId",
                fields: PROFILE_CARD,
            },
            Relation {
                name: "recipient",
                key: "to_user",
                target: "profiles",
                foreign_key: "recipientId",
                fields: PROFILE_CARD,
            },
        ],
        unique: &[&["senderId", "recipientId"]],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: Some("Friend request already sent"),
    },
    TableEntry {
        name: "blocks",
        accessor: "Block",
        group: SchemaGroup::Social,
        columns: &[ID, Column::new("blockerId"), Column::new("blockedId"), CREATED_AT],
        renames: &[("blocked_user_id", "blockedId")],
        enums: &[],
        relations: &[Relation {
            name: "blocked",
            key: "blocked_user",
            target: "profiles",
            foreign_key: "blockedId",
            fields: PROFILE_BRIEF,
        }],
        unique: &[&["blockerId", "blockedId"]],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: Some("User is already blocked"),
    },
    // ---- channels ----
    TableEntry {
        name: "channels",
        accessor: "Channel",
        group: SchemaGroup::Channels,
        columns: &[
            ID,
            Column::new("name"),
            Column::new("description").sparse(),
            Column::new("ownerId"),
            Column::new("isPrivate").default_to(Fill::Bool(false)),
            Column::server("memberCount", Fill::Int(0)),
            CREATED_AT,
        ],
        renames: &[],
        enums: &[],
        relations: &[Relation {
            name: "owner",
            key: "owner",
            target: "profiles",
            foreign_key: "ownerId",
            fields: PROFILE_BRIEF,
        }],
        unique: &[&["name"]],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: Some("Channel name is already taken"),
    },
    TableEntry {
        name: "channel_members",
        accessor: "ChannelMember",
        group: SchemaGroup::Channels,
        columns: &[
            ID,
            Column::new("channelId"),
            Column::new("userId"),
            Column::new("role").default_to(Fill::Text("MEMBER")),
            Column::server("joinedAt", Fill::Now),
        ],
        renames: &[],
        enums: &[EnumRule {
            field: "role",
            on_write: &[],
            on_read: &[],
        }],
        // 旧客户端按 `profiles` 读取成员资料
        relations: &[Relation {
            name: "user",
            key: "profiles",
            target: "profiles",
            foreign_key: "userId",
            fields: PROFILE_CARD,
        }],
        unique: &[&["channelId", "userId"]],
        media_alias: None,
        sender_guard: None,
        membership: Some(MembershipHook {
            channel_field: "channelId",
            user_field: "userId",
            role_field: "role",
            elevated: &["OWNER", "ADMIN", "MODERATOR"],
            count_table: "channels",
        }),
        conflict_message: Some("User is already a member of this channel"),
    },
    TableEntry {
        name: "channel_invites",
        accessor: "ChannelInvite",
        group: SchemaGroup::Channels,
        columns: &[
            ID,
            Column::new("channelId"),
            Column::new("inviterId"),
            Column::new("inviteeId"),
            Column::new("status").default_to(Fill::Text("PENDING")),
            CREATED_AT,
        ],
        renames: &[("invited_by", "inviterId"), ("user_id", "inviteeId")],
        enums: &[EnumRule {
            field: "status",
            ..REQUEST_STATUS
        }],
        relations: &[
            Relation {
                name: "channel",
                key: "channel",
                target: "channels",
                foreign_key: "channelId",
                fields: &["id", "name", "isPrivate"],
            },
            Relation {
                name: "inviter",
                key: "inviter",
                target: "profiles",
                foreign_key: "inviterId",
                fields: PROFILE_BRIEF,
            },
        ],
        unique: &[&["channelId", "inviteeId"]],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: Some("User has already been invited to this channel"),
    },
    TableEntry {
        name: "posts",
        accessor: "Post",
        group: SchemaGroup::Channels,
        columns: &[
            ID,
            Column::new("channelId"),
            Column::new("authorId"),
            Column::new("content"),
            Column::new("imageUrl").sparse(),
            CREATED_AT,
        ],
        renames: &[],
        enums: &[],
        relations: &[Relation {
            name: "author",
            key: "author",
            target: "profiles",
            foreign_key: "authorId",
            fields: PROFILE_CARD,
        }],
        unique: &[],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: None,
    },
    TableEntry {
        name: "bots",
        accessor: "Bot",
        group: SchemaGroup::Channels,
        columns: &[
            ID,
            Column::new("channelId"),
            Column::new("name"),
            Column::new("trigger"),
            Column::new("response"),
            Column::new("isActive").default_to(Fill::Bool(true)),
            Column::new("createdBy"),
            CREATED_AT,
        ],
        renames: &[],
        enums: &[EnumRule {
            field: "trigger",
            on_write: &[],
            on_read: &[],
        }],
        relations: &[],
        unique: &[&["channelId", "name"]],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: Some("A bot with this name already exists in the channel"),
    },
    // ---- messaging ----
    TableEntry {
        name: "conversations",
        accessor: "Conversation",
        group: SchemaGroup::Messaging,
        columns: &[
            ID,
            Column::new("name").sparse(),
            Column::new("isGroup").default_to(Fill::Bool(false)),
            CREATED_AT,
        ],
        renames: &[],
        enums: &[],
        relations: &[],
        unique: &[],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: None,
    },
    TableEntry {
        name: "conversation_participants",
        accessor: "ConversationParticipant",
        group: SchemaGroup::Messaging,
        columns: &[
            ID,
            Column::new("conversationId"),
            Column::new("userId"),
            Column::server("joinedAt", Fill::Now),
        ],
        renames: &[],
        enums: &[],
        relations: &[Relation {
            name: "user",
            key: "profiles",
            target: "profiles",
            foreign_key: "userId",
            fields: PROFILE_CARD,
        }],
        unique: &[&["conversationId", "userId"]],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: Some("User is already in this conversation"),
    },
    TableEntry {
        name: "messages",
        accessor: "Message",
        group: SchemaGroup::Messaging,
        columns: &[
            ID,
            Column::new("conversationId"),
            Column::new("senderId"),
            Column::new("content").sparse(),
            Column::new("mediaType").sparse(),
            Column::new("mediaUrl").sparse(),
            CREATED_AT,
        ],
        renames: &[],
        enums: &[EnumRule {
            field: "mediaType",
            on_write: &[],
            on_read: &[],
        }],
        relations: &[Relation {
            name: "sender",
            key: "sender",
            target: "profiles",
            foreign_key: "senderId",
            fields: PROFILE_BRIEF,
        }],
        unique: &[],
        media_alias: Some(MediaAlias {
            legacy: "gif_url",
            type_field: "mediaType",
            url_field: "mediaUrl",
            marker: "GIF",
        }),
        sender_guard: Some(SenderGuard {
            sender_field: "senderId",
            scope_field: "conversationId",
            participants: "conversation_participants",
            participant_scope: "conversationId",
            participant_user: "userId",
            blocks: "blocks",
            blocker: "blockerId",
            blocked: "blockedId",
        }),
        membership: None,
        conflict_message: None,
    },
    // ---- moderation ----
    TableEntry {
        name: "reports",
        accessor: "Report",
        group: SchemaGroup::Moderation,
        columns: &[
            ID,
            Column::new("reporterId"),
            Column::new("targetType"),
            Column::new("targetId"),
            Column::new("reason"),
            Column::new("status").default_to(Fill::Text("OPEN")),
            CREATED_AT,
        ],
        renames: &[],
        enums: &[
            EnumRule {
                field: "targetType",
                on_write: &[],
                on_read: &[],
            },
            EnumRule {
                field: "status",
                on_write: &[("resolved", "ACTIONED")],
                on_read: &[("ACTIONED", "resolved")],
            },
        ],
        relations: &[Relation {
            name: "reporter",
            key: "reporter",
            target: "profiles",
            foreign_key: "reporterId",
            fields: PROFILE_BRIEF,
        }],
        unique: &[],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: None,
    },
    TableEntry {
        name: "channel_bans",
        accessor: "ChannelBan",
        group: SchemaGroup::Moderation,
        columns: &[
            ID,
            Column::new("channelId"),
            Column::new("userId"),
            Column::new("bannedBy"),
            Column::new("reason").sparse(),
            Column::new("expiresAt").timestamp().sparse(),
            CREATED_AT,
        ],
        renames: &[],
        enums: &[],
        relations: &[Relation {
            name: "user",
            key: "user",
            target: "profiles",
            foreign_key: "userId",
            fields: PROFILE_BRIEF,
        }],
        unique: &[&["channelId", "userId"]],
        media_alias: None,
        sender_guard: None,
        membership: None,
        conflict_message: Some("User is already banned from this channel"),
    },
];
