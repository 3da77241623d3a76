/*!

This is the long-form manual for `survey_vetting` and `stvet`.

## Form fields

Each data row (one base path in one locale) posts the following fields:

* the choice token
* `value` and `reference`, used with `change to`
* a set of item tags to delete
* a set of item tags whose votes are removed (TC and above)

### Choice tokens

| token                       | meaning                                              |
|-----------------------------|------------------------------------------------------|
| empty, `nochange`           | nothing to do                                        |
| `confirm`                   | vote for the baseline (`current`) value              |
| `abstain`                   | retract the vote of the user                         |
| `change to`                 | submit the posted value                              |
| `current`                   | vote for the value stored at the base path           |
| `inherited-value`           | copy the inherited value into this locale            |
| `proposed-u<user>-<n>`      | vote for that proposed value                         |

Any other token is reported as an unknown choice.

Picking an inherited, fallback or aliased value never votes for it: the value is
submitted as a new proposal of the user, then voted for.

A posted value identical to an existing value turns into a vote for that value.

Deleting requires being the submitter of the item (or TC). Items that other users
still vote for cannot be deleted.

## Results

After a section is processed, the results of the changed locales are recomputed.
A value wins when it reaches quorum: one vote of an expert or an administrator, or
votes of vetters from two different organizations.

| status         | meaning                                               |
|----------------|-------------------------------------------------------|
| `unanimous`    | only one value has votes, and it reached quorum       |
| `good`         | one value reached quorum                              |
| `admin`        | an administrator's vote decided                       |
| `removal`      | the winning vote is for removing the value            |
| `disputed`     | several values have vetter votes                      |
| `insufficient` | votes exist, none reached quorum                      |
| `noChange`     | existing data, nobody voted                           |
| `noVotes`      | proposals exist, nobody voted                         |

## Batch input

`stvet` replays submissions described in a JSON configuration file:

```text
{
  "outputSettings": { "batchName": "basic" },
  "rules": { "emptyAllowedPaths": ["^//ldml/fallback"], "advisoryChecks": ["CheckCoverage"], "readonly": false },
  "checks": { "maxValueLength": 80, "coveragePrefixes": [] },
  "users": [ { "id": 1, "email": "a@acme.example", "org": "acme", "level": "vetter", "locales": ["fr"] } ],
  "data": [ { "locale": "fr", "xpath": "//ldml/...", "value": "allemand" } ],
  "submissions": [ { "user": 1, "locale": "fr", "xpath": "//ldml/...", "choice": "confirm" } ],
  "submissionSources": [ { "provider": "xlsx", "filePath": "votes.xlsx", "excelWorksheetName": "Sheet1" } ]
}
```

### `json`

A file holding an array of submissions, with the same fields as the inline
`submissions`.

### `xlsx`

An Excel spreadsheet. The first row is a header, then one submission per row with the
columns `user`, `locale`, `xpath`, `choice`, `value`, `reference`, `delete`, `unvote`.
The `delete` and `unvote` columns hold tags separated by `;`.

 */
